//! Room actor: an isolated Tokio task that owns one bingo game.
//!
//! Each room runs in its own task and talks to the outside world through
//! an mpsc channel. The actor's `select!` loop services that channel and
//! the room's [`DrawClock`], so a number call and a claim are never
//! processed at the same time: whichever arrives first is handled to
//! completion before the other is looked at.
//!
//! Joins are the one operation that leaves the actor mid-way. Debiting the
//! stake is a remote call, so a join reserves a seat, debits outside the
//! actor, then commits:
//!
//! ```text
//! RoomHandle::join ── Reserve ──▶ actor   (seat held)
//!                  ── wallet.debit ──▶    (actor keeps serving)
//!                  ── Commit ──▶ actor    (participant added, or lapsed → refund)
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;

use bingo_game::{Card, Draw, DrawSequencer, WinLine};
use bingo_hub::BroadcastHub;
use bingo_protocol::{
    Amount, CardId, ParticipantStatus, PlayerSummary, RoomId, RoomStatus, RoomSummary,
    ServerMessage, UserId, VoidReason,
};
use bingo_tick::{DrawClock, TickInfo};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use crate::participant::{Participant, ParticipantView};
use crate::store::{Outcome, RoomRecord, RoomStore};
use crate::wallet::{TxnId, Wallet};
use crate::writer::StoreWriter;
use crate::{RoomConfig, RoomError};

// ---------------------------------------------------------------------------
// Public results
// ---------------------------------------------------------------------------

/// A completed join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReceipt {
    pub room_id: RoomId,
    pub card_ids: Vec<CardId>,
    pub player_count: usize,
}

/// The answer to a win claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub has_won: bool,
    pub pattern: Option<WinLine>,
    pub status: ParticipantStatus,
    pub winning_amount: Option<Amount>,
    /// `true` once the pot has been credited. A winning claim whose credit
    /// failed reports `false`; see [`RoomHandle::retry_payout`].
    pub settled: bool,
}

/// A point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub game_key: Uuid,
    pub name: String,
    pub stake: Amount,
    pub max_players: usize,
    pub player_count: usize,
    /// Joins holding a seat while their debit is in flight.
    pub pending_joins: usize,
    pub status: RoomStatus,
    /// The call log, in draw order.
    pub called: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
}

impl RoomSnapshot {
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id,
            name: self.name.clone(),
            stake: self.stake,
            player_count: self.player_count,
            max_players: self.max_players,
            status: self.status,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A seat held for a join whose debit is in flight.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Grant {
    epoch: u32,
    stake: Amount,
    game_key: Uuid,
}

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Reserve {
        user: UserId,
        card_ids: Vec<CardId>,
        reply: Reply<Grant>,
    },
    Release {
        user: UserId,
        epoch: u32,
    },
    Commit {
        user: UserId,
        epoch: u32,
        cards: Vec<(CardId, Card)>,
        reply: Reply<JoinReceipt>,
    },
    Start {
        reply: Reply<()>,
    },
    Mark {
        user: UserId,
        card_index: usize,
        number: u8,
        reply: Reply<bool>,
    },
    ClaimWin {
        user: UserId,
        card_index: usize,
        reply: Reply<ClaimReceipt>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Participant {
        user: UserId,
        reply: oneshot::Sender<Option<ParticipantView>>,
    },
    Abandon {
        reply: Reply<bool>,
    },
    RetryPayout {
        reply: Reply<()>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Collaborators every room of one manager shares.
pub(crate) struct Shared {
    pub(crate) hub: Arc<BroadcastHub>,
    pub(crate) wallet: Arc<dyn Wallet>,
    pub(crate) store: Arc<dyn RoomStore>,
    pub(crate) config: RoomConfig,
}

/// Handle to a running room actor.
///
/// Cheap to clone: an `mpsc::Sender` plus an `Arc`.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
    shared: Arc<Shared>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Joins `user` with the given stored cards, debiting the stake.
    ///
    /// Runs in its own task, so dropping this future doesn't strand a
    /// reserved seat or an unrefunded debit.
    pub async fn join(&self, user: UserId, card_ids: Vec<CardId>) -> Result<JoinReceipt, RoomError> {
        let this = self.clone();
        tokio::spawn(async move { this.settle_join(user, card_ids).await })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    pub async fn mark(&self, user: UserId, card_index: usize, number: u8) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Mark {
            user,
            card_index,
            number,
            reply,
        })
        .await?
    }

    pub async fn claim_win(&self, user: UserId, card_index: usize) -> Result<ClaimReceipt, RoomError> {
        self.request(|reply| RoomCommand::ClaimWin {
            user,
            card_index,
            reply,
        })
        .await?
    }

    pub async fn start(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    pub async fn participant(&self, user: UserId) -> Result<Option<ParticipantView>, RoomError> {
        self.request(|reply| RoomCommand::Participant { user, reply })
            .await
    }

    /// Voids a game in play. Returns `false` if it had already finished.
    pub async fn abandon(&self) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Abandon { reply }).await?
    }

    /// Re-issues a failed pot credit under the same transaction id.
    pub async fn retry_payout(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::RetryPayout { reply })
            .await?
    }

    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Sends a command carrying a reply channel and waits for the answer.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    async fn settle_join(self, user: UserId, card_ids: Vec<CardId>) -> Result<JoinReceipt, RoomError> {
        let grant = self
            .request(|reply| RoomCommand::Reserve {
                user,
                card_ids: card_ids.clone(),
                reply,
            })
            .await??;

        let cards = match self.load_cards(user, &card_ids).await {
            Ok(cards) => cards,
            Err(e) => {
                self.release(user, grant.epoch).await;
                return Err(e);
            }
        };

        let wallet_timeout = self.shared.config.wallet_timeout;
        let txn = TxnId::join(grant.game_key, user, grant.epoch);
        let debit = timeout(
            wallet_timeout,
            self.shared.wallet.debit(user, grant.stake, &txn),
        )
        .await;
        match debit {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::info!(room_id = %self.room_id, user_id = %user, error = %e, "stake debit refused");
                self.release(user, grant.epoch).await;
                return Err(e.into());
            }
            Err(_) => {
                // Outcome unknown. The epoch is kept, so a retry reuses
                // this txn id and the wallet won't charge twice.
                tracing::warn!(room_id = %self.room_id, user_id = %user, %txn, "stake debit timed out");
                self.release(user, grant.epoch).await;
                return Err(RoomError::WalletTimeout);
            }
        }

        let committed = self
            .request(|reply| RoomCommand::Commit {
                user,
                epoch: grant.epoch,
                cards,
                reply,
            })
            .await
            .and_then(|result| result);
        match committed {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.refund(user, grant).await;
                Err(e)
            }
        }
    }

    async fn load_cards(
        &self,
        user: UserId,
        card_ids: &[CardId],
    ) -> Result<Vec<(CardId, Card)>, RoomError> {
        let mut cards = Vec::with_capacity(card_ids.len());
        for &card_id in card_ids {
            let record = self
                .shared
                .store
                .card(card_id)
                .await?
                .ok_or(RoomError::UnknownCard(card_id))?;
            if record.owner != user {
                return Err(RoomError::CardNotOwned {
                    card: card_id,
                    user,
                });
            }
            cards.push((card_id, record.card));
        }
        Ok(cards)
    }

    async fn release(&self, user: UserId, epoch: u32) {
        if self
            .sender
            .send(RoomCommand::Release { user, epoch })
            .await
            .is_err()
        {
            tracing::debug!(room_id = %self.room_id, user_id = %user, "room gone before release");
        }
    }

    async fn refund(&self, user: UserId, grant: Grant) {
        let txn = TxnId::refund(grant.game_key, user, grant.epoch);
        let result = timeout(
            self.shared.config.wallet_timeout,
            self.shared.wallet.credit(user, grant.stake, &txn),
        )
        .await;
        match result {
            Ok(Ok(())) => {
                tracing::info!(room_id = %self.room_id, user_id = %user, %txn, "stake refunded");
            }
            Ok(Err(e)) => {
                tracing::error!(room_id = %self.room_id, user_id = %user, %txn, error = %e, "stake refund failed");
            }
            Err(_) => {
                tracing::error!(room_id = %self.room_id, user_id = %user, %txn, "stake refund timed out");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Everything needed to bring a room actor up.
pub(crate) struct RoomInit {
    pub(crate) room_id: RoomId,
    pub(crate) game_key: Uuid,
    pub(crate) name: String,
    pub(crate) stake: Amount,
    pub(crate) max_players: usize,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) participants: Vec<Participant>,
}

struct RoomActor {
    room_id: RoomId,
    game_key: Uuid,
    name: String,
    stake: Amount,
    max_players: usize,
    status: RoomStatus,
    participants: BTreeMap<UserId, Participant>,
    /// Seats held by joins in flight, with the epoch they debit under.
    reservations: HashMap<UserId, u32>,
    /// Bumped each time a user's stake is refunded, so the next join
    /// debits under a fresh transaction id.
    epochs: HashMap<UserId, u32>,
    draw: DrawSequencer,
    clock: DrawClock,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    outcome: Option<Outcome>,
    shared: Arc<Shared>,
    writer: StoreWriter,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, name = %self.name, stake = self.stake, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle(cmd).await.is_break() {
                        break;
                    }
                }
                tick = self.clock.wait_for_tick() => self.on_tick(tick),
            }
        }

        self.clock.disarm();
        tracing::info!(room_id = %self.room_id, status = %self.status, "room actor stopped");
    }

    async fn handle(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Reserve {
                user,
                card_ids,
                reply,
            } => {
                let _ = reply.send(self.reserve(user, &card_ids));
            }
            RoomCommand::Release { user, epoch } => self.release(user, epoch),
            RoomCommand::Commit {
                user,
                epoch,
                cards,
                reply,
            } => {
                let _ = reply.send(self.commit(user, epoch, cards));
            }
            RoomCommand::Start { reply } => {
                let _ = reply.send(self.start());
            }
            RoomCommand::Mark {
                user,
                card_index,
                number,
                reply,
            } => {
                let _ = reply.send(self.mark(user, card_index, number));
            }
            RoomCommand::ClaimWin {
                user,
                card_index,
                reply,
            } => {
                let result = self.claim_win(user, card_index).await;
                let _ = reply.send(result);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::Participant { user, reply } => {
                let _ = reply.send(self.participants.get(&user).map(Participant::view));
            }
            RoomCommand::Abandon { reply } => {
                let _ = reply.send(self.abandon());
            }
            RoomCommand::RetryPayout { reply } => {
                let result = match &self.outcome {
                    Some(Outcome::Won { settled: false, .. }) => self.settle_payout().await,
                    _ => Err(RoomError::NothingToSettle(self.room_id)),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_id = %self.room_id, "room shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // -- joins ---------------------------------------------------------------

    fn reserve(&mut self, user: UserId, card_ids: &[CardId]) -> Result<Grant, RoomError> {
        if !self.status.is_joinable() {
            return Err(RoomError::NotJoinable {
                room: self.room_id,
                status: self.status,
            });
        }
        if self.participants.contains_key(&user) || self.reservations.contains_key(&user) {
            return Err(RoomError::AlreadyJoined {
                user,
                room: self.room_id,
            });
        }
        if self.participants.len() + self.reservations.len() >= self.max_players {
            return Err(RoomError::RoomFull(self.room_id));
        }
        let max_cards = self.shared.config.max_cards;
        if card_ids.is_empty() {
            return Err(RoomError::InvalidCardSelection("select at least one card".into()));
        }
        if card_ids.len() > max_cards {
            return Err(RoomError::InvalidCardSelection(format!(
                "at most {max_cards} cards per player"
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = card_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(RoomError::InvalidCardSelection(format!("card {dup} selected twice")));
        }

        let epoch = self.epochs.get(&user).copied().unwrap_or(0);
        self.reservations.insert(user, epoch);
        tracing::debug!(room_id = %self.room_id, user_id = %user, epoch, "seat reserved");
        Ok(Grant {
            epoch,
            stake: self.stake,
            game_key: self.game_key,
        })
    }

    fn release(&mut self, user: UserId, epoch: u32) {
        if self.reservations.get(&user) == Some(&epoch) {
            self.reservations.remove(&user);
            tracing::debug!(room_id = %self.room_id, user_id = %user, "seat released");
        }
    }

    fn commit(
        &mut self,
        user: UserId,
        epoch: u32,
        cards: Vec<(CardId, Card)>,
    ) -> Result<JoinReceipt, RoomError> {
        if self.reservations.get(&user) != Some(&epoch) {
            // The caller refunds under this epoch; the next join must not
            // reuse its debit id.
            let current = self.epochs.entry(user).or_insert(0);
            if *current == epoch {
                *current += 1;
            }
            tracing::info!(room_id = %self.room_id, user_id = %user, status = %self.status, "reservation lapsed");
            return Err(RoomError::ReservationLapsed(self.room_id));
        }
        self.reservations.remove(&user);

        let participant = Participant::new(user, cards);
        let card_ids = participant.card_ids();
        self.writer.save_participant(participant.record(self.room_id));
        self.participants.insert(user, participant);
        self.save_room();

        let player_count = self.participants.len();
        tracing::info!(room_id = %self.room_id, user_id = %user, players = player_count, "player joined");
        self.broadcast(ServerMessage::PlayerJoined {
            player_count,
            user: PlayerSummary { id: user },
        });

        Ok(JoinReceipt {
            room_id: self.room_id,
            card_ids,
            player_count,
        })
    }

    // -- lifecycle -----------------------------------------------------------

    fn start(&mut self) -> Result<(), RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::CannotStart {
                room: self.room_id,
                status: self.status,
            });
        }
        if self.participants.is_empty() {
            return Err(RoomError::NoParticipants(self.room_id));
        }

        match self.shared.config.draw_seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(self.room_id.0));
                self.draw.shuffle_with(&mut rng);
            }
            None => self.draw.shuffle(),
        }
        let dropped = self.reservations.len();
        self.reservations.clear();

        self.transition(RoomStatus::Starting);
        self.started_at = Some(Utc::now());
        self.clock.arm();
        self.save_room();

        tracing::info!(
            room_id = %self.room_id,
            players = self.participants.len(),
            dropped_reservations = dropped,
            "game starting"
        );
        self.broadcast(ServerMessage::GameStarted {
            starts_in_ms: self.clock.start_delay().as_millis() as u64,
        });
        Ok(())
    }

    fn on_tick(&mut self, tick: TickInfo) {
        if !self.status.is_active() {
            self.clock.disarm();
            return;
        }
        if self.status == RoomStatus::Starting {
            self.transition(RoomStatus::Running);
            self.save_room();
        }

        match self.draw.next() {
            Draw::Called(ball) => {
                self.writer.append_call(ball.number);
                let total_called = self.draw.count();
                tracing::debug!(
                    room_id = %self.room_id,
                    number = ball.number,
                    total_called,
                    overrun = tick.overrun,
                    "number called"
                );
                self.broadcast(ServerMessage::NumberCalled {
                    number: ball.number,
                    letter: ball.letter,
                    total_called,
                });
            }
            Draw::Exhausted => self.finish_void(VoidReason::Exhausted),
        }
    }

    fn abandon(&mut self) -> Result<bool, RoomError> {
        match self.status {
            RoomStatus::Starting | RoomStatus::Running => {
                self.finish_void(VoidReason::Abandoned);
                Ok(true)
            }
            RoomStatus::Finished => Ok(false),
            RoomStatus::Waiting => Err(RoomError::NotActive {
                room: self.room_id,
                status: self.status,
            }),
        }
    }

    fn finish_void(&mut self, reason: VoidReason) {
        self.finish();
        for participant in self.participants.values_mut() {
            if participant.status == ParticipantStatus::Playing {
                participant.status = ParticipantStatus::Lost;
                self.writer.save_participant(participant.record(self.room_id));
            }
        }
        self.outcome = Some(Outcome::Void { reason });
        self.save_room();

        let total_called = self.draw.count();
        tracing::info!(room_id = %self.room_id, %reason, total_called, "game void");
        self.broadcast(ServerMessage::GameVoid {
            reason,
            total_called,
        });
    }

    fn finish(&mut self) {
        self.transition(RoomStatus::Finished);
        self.ended_at = Some(Utc::now());
        self.clock.disarm();
    }

    fn transition(&mut self, to: RoomStatus) {
        if !self.status.can_transition_to(to) {
            tracing::warn!(room_id = %self.room_id, from = %self.status, %to, "illegal transition ignored");
            return;
        }
        tracing::debug!(room_id = %self.room_id, from = %self.status, %to, "status change");
        self.status = to;
    }

    // -- play ----------------------------------------------------------------

    fn mark(&mut self, user: UserId, card_index: usize, number: u8) -> Result<bool, RoomError> {
        if !self.status.is_active() {
            return Err(RoomError::NotActive {
                room: self.room_id,
                status: self.status,
            });
        }
        let participant = self
            .participants
            .get_mut(&user)
            .ok_or(RoomError::NotParticipant {
                user,
                room: self.room_id,
            })?;
        let newly_marked = participant.mark(card_index, number, &self.draw)?;
        if newly_marked {
            self.writer.save_participant(participant.record(self.room_id));
        }
        Ok(newly_marked)
    }

    async fn claim_win(&mut self, user: UserId, card_index: usize) -> Result<ClaimReceipt, RoomError> {
        if self.status != RoomStatus::Running {
            return Err(RoomError::NotActive {
                room: self.room_id,
                status: self.status,
            });
        }
        let participant = self
            .participants
            .get(&user)
            .ok_or(RoomError::NotParticipant {
                user,
                room: self.room_id,
            })?;
        if participant.status.is_terminal() {
            return Err(RoomError::ParticipantFinished {
                user,
                status: participant.status,
            });
        }

        let Some(line) = participant.evaluate(card_index)? else {
            tracing::debug!(room_id = %self.room_id, user_id = %user, card_index, "claim without a line");
            return Ok(ClaimReceipt {
                has_won: false,
                pattern: None,
                status: ParticipantStatus::Playing,
                winning_amount: None,
                settled: false,
            });
        };

        // Winner, losers, and the room status flip together; nothing else
        // runs on this actor until the claim returns.
        for p in self.participants.values_mut() {
            p.status = if p.user == user {
                ParticipantStatus::Won
            } else if p.status == ParticipantStatus::Playing {
                ParticipantStatus::Lost
            } else {
                p.status
            };
            self.writer.save_participant(p.record(self.room_id));
        }
        self.finish();

        let payout = self.stake.saturating_mul(self.participants.len() as Amount);
        let pattern = line.to_string();
        self.outcome = Some(Outcome::Won {
            user,
            pattern: pattern.clone(),
            payout,
            settled: false,
        });
        tracing::info!(room_id = %self.room_id, user_id = %user, %pattern, payout, "bingo");

        let settled = self.settle_payout().await.is_ok();
        self.broadcast(ServerMessage::PlayerWon {
            user_id: user,
            pattern,
            winning_amount: payout,
        });

        Ok(ClaimReceipt {
            has_won: true,
            pattern: Some(line),
            status: ParticipantStatus::Won,
            winning_amount: Some(payout),
            settled,
        })
    }

    /// Credits the pot to the winner under the game's payout txn id.
    async fn settle_payout(&mut self) -> Result<(), RoomError> {
        let (user, payout) = match &self.outcome {
            Some(Outcome::Won {
                user,
                payout,
                settled: false,
                ..
            }) => (*user, *payout),
            _ => return Err(RoomError::NothingToSettle(self.room_id)),
        };
        let txn = TxnId::payout(self.game_key);
        let result = match timeout(
            self.shared.config.wallet_timeout,
            self.shared.wallet.credit(user, payout, &txn),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RoomError::from(e)),
            Err(_) => Err(RoomError::WalletTimeout),
        };

        match &result {
            Ok(()) => {
                if let Some(Outcome::Won { settled, .. }) = &mut self.outcome {
                    *settled = true;
                }
                tracing::info!(room_id = %self.room_id, user_id = %user, %txn, payout, "pot credited");
            }
            Err(e) => {
                tracing::error!(room_id = %self.room_id, user_id = %user, %txn, error = %e, "pot credit failed");
            }
        }
        self.save_room();
        result
    }

    // -- output --------------------------------------------------------------

    fn broadcast(&self, msg: ServerMessage) {
        let delivered = self.shared.hub.broadcast(self.room_id, msg);
        tracing::trace!(room_id = %self.room_id, delivered, "event broadcast");
    }

    fn save_room(&self) {
        self.writer.save_room(self.record());
    }

    fn record(&self) -> RoomRecord {
        RoomRecord {
            room_id: self.room_id,
            game_key: self.game_key,
            name: self.name.clone(),
            stake: self.stake,
            max_players: self.max_players,
            current_players: self.participants.len(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            outcome: self.outcome.clone(),
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id,
            game_key: self.game_key,
            name: self.name.clone(),
            stake: self.stake,
            max_players: self.max_players,
            player_count: self.participants.len(),
            pending_joins: self.reservations.len(),
            status: self.status,
            called: self.draw.drawn().to_vec(),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            outcome: self.outcome.clone(),
        }
    }
}

/// Spawns a room actor and its store writer.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_room(init: RoomInit, shared: Arc<Shared>) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(shared.config.channel_size);
    let (writer, _writer_task) = StoreWriter::spawn(init.room_id, Arc::clone(&shared.store));

    let actor = RoomActor {
        room_id: init.room_id,
        game_key: init.game_key,
        name: init.name,
        stake: init.stake,
        max_players: init.max_players,
        status: RoomStatus::Waiting,
        participants: init
            .participants
            .into_iter()
            .map(|p| (p.user, p))
            .collect(),
        reservations: HashMap::new(),
        epochs: HashMap::new(),
        draw: DrawSequencer::new(),
        clock: DrawClock::new(shared.config.clock_config()),
        created_at: init.created_at,
        started_at: None,
        ended_at: None,
        outcome: None,
        shared: Arc::clone(&shared),
        writer,
        receiver: rx,
    };
    actor.save_room();

    let task = tokio::spawn(actor.run());
    let handle = RoomHandle {
        room_id: init.room_id,
        sender: tx,
        shared,
    };
    (handle, task)
}
