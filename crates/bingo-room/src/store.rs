//! The persistence seam.
//!
//! Rooms run from memory; the store is a projection written behind the
//! room actor (see [`crate::writer`]) plus the card inventory. A store
//! that forgets everything on restart is acceptable: in-flight games are
//! lost, which [`RoomManager::recover`](crate::RoomManager::recover)
//! reports rather than hides.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bingo_game::Card;
use bingo_protocol::{
    Amount, CardId, CardView, ParticipantStatus, RoomId, RoomStatus, RoomSummary, UserId,
    VoidReason,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// How a finished room ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Won {
        user: UserId,
        pattern: String,
        payout: Amount,
        /// `false` until the pot credit has gone through.
        settled: bool,
    },
    Void {
        reason: VoidReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: RoomId,
    /// Per-game idempotency namespace for wallet transactions.
    pub game_key: Uuid,
    pub name: String,
    pub stake: Amount,
    pub max_players: usize,
    pub current_players: usize,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
}

impl RoomRecord {
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id,
            name: self.name.clone(),
            stake: self.stake,
            player_count: self.current_players,
            max_players: self.max_players,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub card_ids: Vec<CardId>,
    /// Marked numbers, one set per card.
    pub marked: Vec<BTreeSet<u8>>,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub card_id: CardId,
    pub owner: UserId,
    pub card: Card,
    pub created_at: DateTime<Utc>,
}

impl CardRecord {
    pub fn view(&self) -> CardView {
        CardView {
            card_id: self.card_id,
            numbers: self.card,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("room {0} has no stored record")]
    MissingRoom(RoomId),
}

/// Durable room, participant, call-log and card storage.
#[async_trait]
pub trait RoomStore: Send + Sync + 'static {
    /// Inserts or replaces the room's record.
    async fn save_room(&self, room: &RoomRecord) -> Result<(), StoreError>;

    async fn load_room(&self, room: RoomId) -> Result<Option<RoomRecord>, StoreError>;

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError>;

    /// Inserts or replaces the participant's record.
    async fn save_participant(&self, participant: &ParticipantRecord) -> Result<(), StoreError>;

    async fn participants(&self, room: RoomId) -> Result<Vec<ParticipantRecord>, StoreError>;

    /// Appends one call to the room's log. Called in draw order.
    async fn append_call(&self, room: RoomId, number: u8) -> Result<(), StoreError>;

    async fn calls(&self, room: RoomId) -> Result<Vec<u8>, StoreError>;

    /// Stores freshly generated cards for `owner`, assigning ids.
    async fn insert_cards(&self, owner: UserId, cards: Vec<Card>)
    -> Result<Vec<CardRecord>, StoreError>;

    async fn card(&self, card: CardId) -> Result<Option<CardRecord>, StoreError>;

    async fn cards_for_user(&self, owner: UserId) -> Result<Vec<CardRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    rooms: BTreeMap<RoomId, RoomRecord>,
    participants: HashMap<RoomId, BTreeMap<UserId, ParticipantRecord>>,
    calls: HashMap<RoomId, Vec<u8>>,
    cards: BTreeMap<CardId, CardRecord>,
}

/// In-process [`RoomStore`]. Forgets everything when dropped.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    next_card: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            next_card: AtomicU64::new(1),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn save_room(&self, room: &RoomRecord) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .rooms
            .insert(room.room_id, room.clone());
        Ok(())
    }

    async fn load_room(&self, room: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.tables.lock().await.rooms.get(&room).cloned())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        Ok(self.tables.lock().await.rooms.values().cloned().collect())
    }

    async fn save_participant(&self, participant: &ParticipantRecord) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .participants
            .entry(participant.room_id)
            .or_default()
            .insert(participant.user_id, participant.clone());
        Ok(())
    }

    async fn participants(&self, room: RoomId) -> Result<Vec<ParticipantRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .participants
            .get(&room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_call(&self, room: RoomId, number: u8) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let log = tables.calls.entry(room).or_default();
        if !log.contains(&number) {
            log.push(number);
        }
        Ok(())
    }

    async fn calls(&self, room: RoomId) -> Result<Vec<u8>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .calls
            .get(&room)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_cards(
        &self,
        owner: UserId,
        cards: Vec<Card>,
    ) -> Result<Vec<CardRecord>, StoreError> {
        let now = Utc::now();
        let records: Vec<CardRecord> = cards
            .into_iter()
            .map(|card| CardRecord {
                card_id: CardId(self.next_card.fetch_add(1, Ordering::Relaxed)),
                owner,
                card,
                created_at: now,
            })
            .collect();
        let mut tables = self.tables.lock().await;
        for record in &records {
            tables.cards.insert(record.card_id, record.clone());
        }
        Ok(records)
    }

    async fn card(&self, card: CardId) -> Result<Option<CardRecord>, StoreError> {
        Ok(self.tables.lock().await.cards.get(&card).cloned())
    }

    async fn cards_for_user(&self, owner: UserId) -> Result<Vec<CardRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .cards
            .values()
            .filter(|record| record.owner == owner)
            .cloned()
            .collect())
    }
}
