//! Room manager: creates, tracks, reaps, and routes requests to rooms.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bingo_hub::BroadcastHub;
use bingo_protocol::{CardId, CardView, ParticipantStatus, RoomId, RoomStatus, RoomSummary, UserId, VoidReason};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, timeout};
use uuid::Uuid;

use crate::participant::{Participant, ParticipantView};
use crate::room::{RoomInit, Shared, spawn_room};
use crate::store::{Outcome, RoomStore};
use crate::wallet::{TxnId, Wallet};
use crate::{ClaimReceipt, JoinReceipt, RoomConfig, RoomError, RoomHandle, RoomSettings, RoomSnapshot};

/// How long [`RoomManager::destroy`] waits for an idle actor to stop,
/// on top of one wallet call it may be finishing.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// How long [`RoomManager::list_rooms`] waits for any one room.
const LISTING_TIMEOUT: Duration = Duration::from_millis(250);

/// A hosted room: its handle plus the actor task.
struct RoomSlot {
    handle: RoomHandle,
    task: JoinHandle<()>,
    game_key: Uuid,
}

/// What one [`RoomManager::reap`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Rooms shut down and dropped from the registry.
    pub removed: Vec<RoomId>,
    /// Games voided because nobody was connected to them.
    pub abandoned: Vec<RoomId>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.abandoned.is_empty()
    }
}

/// What [`RoomManager::recover`] found in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Waiting rooms hosted again with their participants.
    pub rehosted: Vec<RoomId>,
    /// Games that were in play when the process stopped.
    pub voided: Vec<RoomId>,
}

/// Owns every room actor in the process.
///
/// This is the entry point for room operations from the connection
/// layer. All methods take `&self`; the registry is a `DashMap`, and no
/// shard guard is held across an await.
pub struct RoomManager {
    rooms: DashMap<RoomId, RoomSlot>,
    next_id: AtomicU64,
    /// When each room was first seen without connections.
    unattended: DashMap<RoomId, Instant>,
    shared: Arc<Shared>,
}

impl RoomManager {
    pub fn new(
        config: RoomConfig,
        hub: Arc<BroadcastHub>,
        wallet: Arc<dyn Wallet>,
        store: Arc<dyn RoomStore>,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            next_id: AtomicU64::new(1),
            unattended: DashMap::new(),
            shared: Arc::new(Shared {
                hub,
                wallet,
                store,
                config: config.validated(),
            }),
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.shared.hub
    }

    pub fn config(&self) -> &RoomConfig {
        &self.shared.config
    }

    // -- registry ------------------------------------------------------------

    /// Creates a room with the next free id.
    ///
    /// Ids already taken through [`create_or_get`](Self::create_or_get) or
    /// [`recover`](Self::recover) are skipped, never replaced.
    pub fn create_room(&self, settings: RoomSettings) -> RoomHandle {
        loop {
            let room_id = RoomId(self.next_id.fetch_add(1, Ordering::Relaxed));
            if let Entry::Vacant(vacant) = self.rooms.entry(room_id) {
                let slot = self.host(room_id, settings, Vec::new());
                return vacant.insert(slot).handle.clone();
            }
        }
    }

    /// Returns room `room_id`, creating it with `settings` if absent.
    pub fn create_or_get(&self, room_id: RoomId, settings: RoomSettings) -> RoomHandle {
        self.reserve_id(room_id);
        self.rooms
            .entry(room_id)
            .or_insert_with(|| self.host(room_id, settings, Vec::new()))
            .handle
            .clone()
    }

    pub fn handle(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(&room_id)
            .map(|slot| slot.handle.clone())
            .ok_or(RoomError::NotFound(room_id))
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|slot| *slot.key()).collect();
        ids.sort();
        ids
    }

    /// Summaries of rooms still open to joins, ordered by id.
    ///
    /// Rooms are asked in parallel. One that doesn't answer within
    /// [`LISTING_TIMEOUT`] (busy paying out, shutting down) is left out.
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut pending = JoinSet::new();
        for slot in self.rooms.iter() {
            let handle = slot.handle.clone();
            pending.spawn(async move { timeout(LISTING_TIMEOUT, handle.snapshot()).await });
        }

        let mut summaries = Vec::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(Ok(Ok(snapshot))) if snapshot.status.is_open() => {
                    summaries.push(snapshot.summary());
                }
                Ok(Err(_)) => tracing::debug!("room too slow for the listing, skipped"),
                _ => {}
            }
        }
        summaries.sort_by_key(|summary| summary.room_id);
        summaries
    }

    // -- routing -------------------------------------------------------------

    pub async fn join(
        &self,
        room_id: RoomId,
        user: UserId,
        card_ids: Vec<CardId>,
    ) -> Result<JoinReceipt, RoomError> {
        self.handle(room_id)?.join(user, card_ids).await
    }

    pub async fn mark(
        &self,
        room_id: RoomId,
        user: UserId,
        card_index: usize,
        number: u8,
    ) -> Result<bool, RoomError> {
        self.handle(room_id)?.mark(user, card_index, number).await
    }

    pub async fn claim_win(
        &self,
        room_id: RoomId,
        user: UserId,
        card_index: usize,
    ) -> Result<ClaimReceipt, RoomError> {
        self.handle(room_id)?.claim_win(user, card_index).await
    }

    pub async fn start(&self, room_id: RoomId) -> Result<(), RoomError> {
        self.handle(room_id)?.start().await
    }

    pub async fn room_info(&self, room_id: RoomId) -> Result<RoomSnapshot, RoomError> {
        self.handle(room_id)?.snapshot().await
    }

    pub async fn participant(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Option<ParticipantView>, RoomError> {
        self.handle(room_id)?.participant(user).await
    }

    pub async fn retry_payout(&self, room_id: RoomId) -> Result<(), RoomError> {
        self.handle(room_id)?.retry_payout().await
    }

    // -- cards ---------------------------------------------------------------

    /// Generates `count` fresh cards owned by `user`.
    pub async fn generate_cards(&self, user: UserId, count: usize) -> Result<Vec<CardView>, RoomError> {
        let max = self.shared.config.max_generated_cards;
        if count > max {
            return Err(RoomError::TooManyCards {
                requested: count,
                max,
            });
        }
        if count == 0 {
            return Err(RoomError::InvalidCardSelection("request at least one card".into()));
        }
        let cards = bingo_game::generate(count);
        let stored = self.shared.store.insert_cards(user, cards).await?;
        tracing::debug!(user_id = %user, count, "cards generated");
        Ok(stored.iter().map(|record| record.view()).collect())
    }

    pub async fn my_cards(&self, user: UserId) -> Result<Vec<CardView>, RoomError> {
        let stored = self.shared.store.cards_for_user(user).await?;
        Ok(stored.iter().map(|record| record.view()).collect())
    }

    // -- teardown ------------------------------------------------------------

    /// Drops a finished room that nobody is connected to.
    pub async fn remove(&self, room_id: RoomId) -> Result<(), RoomError> {
        let snapshot = self.room_info(room_id).await?;
        if snapshot.status != RoomStatus::Finished || self.shared.hub.connection_count(room_id) > 0 {
            return Err(RoomError::StillLive(room_id));
        }
        self.destroy(room_id).await
    }

    /// Stops a room's actor and drops it from the registry, whatever its
    /// state. A game in play simply stops calling numbers.
    ///
    /// A pot credit already under way is given the full wallet timeout to
    /// land before the actor is aborted.
    pub async fn destroy(&self, room_id: RoomId) -> Result<(), RoomError> {
        let (_, slot) = self
            .rooms
            .remove(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        self.unattended.remove(&room_id);

        let RoomSlot {
            handle,
            mut task,
            game_key,
        } = slot;
        let grace = SHUTDOWN_GRACE + self.shared.config.wallet_timeout;
        let stopped = timeout(grace, async {
            let _ = handle.shutdown().await;
            let _ = (&mut task).await;
        })
        .await;
        if stopped.is_err() {
            task.abort();
            tracing::error!(
                %room_id,
                txn = %TxnId::payout(game_key),
                "room actor aborted; reconcile this payout if the game had a winner"
            );
        }
        tracing::info!(%room_id, "room destroyed");
        Ok(())
    }

    /// Destroys every room.
    pub async fn shutdown(&self) {
        for room_id in self.room_ids() {
            let _ = self.destroy(room_id).await;
        }
    }

    /// One pass over the registry, acting on rooms nobody is connected to.
    ///
    /// - finished rooms are removed at once;
    /// - waiting rooms with no players are removed after `idle_timeout`;
    /// - games in play are voided as abandoned after `idle_timeout`.
    ///
    /// Waiting rooms that hold paid seats are kept.
    pub async fn reap(&self) -> ReapReport {
        let mut report = ReapReport::default();
        let idle_timeout = self.shared.config.idle_timeout;
        let now = Instant::now();

        for room_id in self.room_ids() {
            let Ok(handle) = self.handle(room_id) else {
                continue;
            };
            let Ok(snapshot) = handle.snapshot().await else {
                tracing::warn!(%room_id, "room actor gone, dropping it");
                if self.destroy(room_id).await.is_ok() {
                    report.removed.push(room_id);
                }
                continue;
            };

            if self.shared.hub.connection_count(room_id) > 0 {
                self.unattended.remove(&room_id);
                continue;
            }
            let since = *self.unattended.entry(room_id).or_insert(now);
            let idle = now.duration_since(since) >= idle_timeout;

            match snapshot.status {
                RoomStatus::Finished => {
                    if self.destroy(room_id).await.is_ok() {
                        report.removed.push(room_id);
                    }
                }
                RoomStatus::Waiting
                    if idle && snapshot.player_count == 0 && snapshot.pending_joins == 0 =>
                {
                    if self.destroy(room_id).await.is_ok() {
                        report.removed.push(room_id);
                    }
                }
                RoomStatus::Starting | RoomStatus::Running if idle => {
                    if let Ok(true) = handle.abandon().await {
                        report.abandoned.push(room_id);
                    }
                }
                _ => {}
            }
        }

        if !report.is_empty() {
            tracing::info!(removed = ?report.removed, abandoned = ?report.abandoned, "reap pass");
        }
        report
    }

    /// Runs [`reap`](Self::reap) every `period` until the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.reap().await;
            }
            tracing::debug!("reaper stopped");
        })
    }

    // -- recovery ------------------------------------------------------------

    /// Rebuilds the registry from the store after a restart.
    ///
    /// Waiting rooms come back with their participants. Games that were in
    /// play can't resume (their draw order is gone), so they are finished
    /// as void with [`VoidReason::Interrupted`].
    pub async fn recover(&self) -> Result<RecoveryReport, RoomError> {
        let mut report = RecoveryReport::default();
        let store = &self.shared.store;

        for mut record in store.list_rooms().await? {
            let room_id = record.room_id;
            self.reserve_id(room_id);
            if self.rooms.contains_key(&room_id) {
                continue;
            }

            match record.status {
                RoomStatus::Waiting => {
                    let mut participants = Vec::new();
                    for stored in store.participants(room_id).await? {
                        let mut cards = Vec::with_capacity(stored.card_ids.len());
                        for &card_id in &stored.card_ids {
                            let card = store
                                .card(card_id)
                                .await?
                                .ok_or(RoomError::UnknownCard(card_id))?;
                            cards.push((card_id, card.card));
                        }
                        participants.push(Participant::restore(&stored, cards));
                    }
                    // Someone may have claimed the id while the store was read.
                    let Entry::Vacant(vacant) = self.rooms.entry(room_id) else {
                        tracing::warn!(%room_id, "room id taken during recovery, skipping");
                        continue;
                    };
                    // The stored game key keeps retried debits idempotent.
                    vacant.insert(self.spawn(RoomInit {
                        room_id,
                        game_key: record.game_key,
                        name: record.name,
                        stake: record.stake,
                        max_players: record.max_players.max(1),
                        created_at: record.created_at,
                        participants,
                    }));
                    report.rehosted.push(room_id);
                }
                RoomStatus::Starting | RoomStatus::Running => {
                    for mut stored in store.participants(room_id).await? {
                        if stored.status == ParticipantStatus::Playing {
                            stored.status = ParticipantStatus::Lost;
                            store.save_participant(&stored).await?;
                        }
                    }
                    record.status = RoomStatus::Finished;
                    record.ended_at = Some(Utc::now());
                    record.outcome = Some(Outcome::Void {
                        reason: VoidReason::Interrupted,
                    });
                    store.save_room(&record).await?;
                    report.voided.push(room_id);
                }
                RoomStatus::Finished => {}
            }
        }

        tracing::info!(rehosted = ?report.rehosted, voided = ?report.voided, "recovery complete");
        Ok(report)
    }

    /// Keeps [`create_room`](Self::create_room) from handing out `room_id`.
    fn reserve_id(&self, room_id: RoomId) {
        self.next_id
            .fetch_max(room_id.0.saturating_add(1), Ordering::Relaxed);
    }

    fn host(&self, room_id: RoomId, settings: RoomSettings, participants: Vec<Participant>) -> RoomSlot {
        self.spawn(RoomInit {
            room_id,
            game_key: Uuid::new_v4(),
            name: settings.name,
            stake: settings.stake,
            max_players: settings
                .max_players
                .unwrap_or(self.shared.config.max_players)
                .max(1),
            created_at: Utc::now(),
            participants,
        })
    }

    fn spawn(&self, init: RoomInit) -> RoomSlot {
        let room_id = init.room_id;
        let game_key = init.game_key;
        let (handle, task) = spawn_room(init, Arc::clone(&self.shared));
        tracing::info!(%room_id, "room created");
        RoomSlot {
            handle,
            task,
            game_key,
        }
    }
}
