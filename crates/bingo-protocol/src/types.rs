//! Core protocol types for Bingo Hall's wire format.
//!
//! Every type here travels "on the wire": it is serialized to JSON,
//! sent over a WebSocket, and parsed by the web client on the other side.
//! Field names and `type` tags are therefore part of the public contract.

use std::fmt;

use bingo_game::{Card, Letter};
use serde::{Deserialize, Serialize};

/// Money, in the smallest unit the wallet tracks (no floating point).
pub type Amount = u64;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A user, as identified by the external identity service.
///
/// Newtype over `u64`: a `RoomId` can't be passed where a `UserId` is
/// expected even though both are integers underneath.
/// `#[serde(transparent)]` keeps the JSON form a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// One bingo room (one independent game with its own pot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A stored card, owned by one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub u64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// Transitions are strictly ordered, with one shortcut:
///
/// ```text
/// Waiting → Starting → Running → Finished
///               └──────────────────↗   (voided before the first call)
/// ```
///
/// - **Waiting**: accepting joins; each join debits the stake.
/// - **Starting**: permutation fixed, `game_started` sent, waiting out the
///   pre-start delay before the first call.
/// - **Running**: numbers are being called; marks and claims accepted.
/// - **Finished**: someone won or the game was voided. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Starting,
    Running,
    Finished,
}

impl RoomStatus {
    /// Returns `true` if the room is accepting new players.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` once the game has started and not yet finished.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Returns `true` if the room is listed in the lobby.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Waiting | Self::Starting)
    }

    /// The next state in the normal progression, `None` from `Finished`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Starting),
            Self::Starting => Some(Self::Running),
            Self::Running => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if moving to `target` keeps the machine monotonic.
    ///
    /// Besides the normal step, an active room may jump straight to
    /// `Finished` (a room abandoned during its pre-start delay).
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (self.is_active() && target == Self::Finished)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// ParticipantStatus
// ---------------------------------------------------------------------------

/// A participant's standing within one room.
///
/// `Won` and `Lost` are terminal: no further marks or claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Playing,
    Won,
    Lost,
}

impl ParticipantStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Playing)
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Won => write!(f, "won"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// Why a room finished without a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidReason {
    /// All 75 numbers were called and nobody claimed.
    Exhausted,
    /// Every connection left a running room and it idled out.
    Abandoned,
    /// The process restarted while the game was in flight.
    Interrupted,
}

impl fmt::Display for VoidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload fragments
// ---------------------------------------------------------------------------

/// A lobby listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub name: String,
    pub stake: Amount,
    pub player_count: usize,
    pub max_players: usize,
    pub status: RoomStatus,
}

/// The public face of a user inside a room event.
///
/// Identity is owned by an external service; only the id is known here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: UserId,
}

/// A stored card as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub card_id: CardId,
    pub numbers: Card,
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Messages a client sends to the server.
///
/// `#[serde(tag = "type")]` produces flat, internally tagged JSON:
/// `{ "type": "mark", "card_index": 0, "number": 23 }`.
/// The first frame on every connection must be [`ClientMessage::Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Binds the connection to a room and a user.
    Hello { room_id: RoomId, user_id: UserId },

    /// Keep-alive.
    Ping,

    /// Asks the server to confirm the connection binding.
    StatusCheck,

    /// Lists rooms that are waiting or starting.
    ListRooms,

    /// Generates and stores fresh cards for this user.
    GenerateCards { count: usize },

    /// Lists this user's stored cards.
    MyCards,

    /// Joins the bound room with the given stored cards; debits the stake.
    Join { card_ids: Vec<CardId> },

    /// Marks a called number on one of the participant's cards.
    Mark { card_index: usize, number: u8 },

    /// Asks the server to check a card for bingo.
    ClaimWin { card_index: usize },

    /// Starts the bound room (operator/scheduler trigger).
    StartGame,

    /// Requests a snapshot of the bound room.
    RoomState,

    /// The client is going away.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Messages the server sends to clients.
///
/// Room events (`player_joined` through `player_left`) are broadcast to
/// every connection in a room. The rest are direct replies to one
/// client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // -- Room events --
    PlayerJoined {
        player_count: usize,
        user: PlayerSummary,
    },
    GameStarted {
        starts_in_ms: u64,
    },
    NumberCalled {
        number: u8,
        letter: Letter,
        total_called: usize,
    },
    PlayerWon {
        user_id: UserId,
        pattern: String,
        winning_amount: Amount,
    },
    GameVoid {
        reason: VoidReason,
        total_called: usize,
    },
    PlayerLeft {
        user_id: UserId,
    },

    // -- Direct replies --
    Welcome {
        room_id: RoomId,
        user_id: UserId,
        status: RoomStatus,
        called: Vec<u8>,
    },
    Pong,
    ConnectionStatus {
        status: String,
        user_id: UserId,
    },
    RoomList {
        rooms: Vec<RoomSummary>,
    },
    Cards {
        cards: Vec<CardView>,
    },
    Joined {
        room_id: RoomId,
        card_ids: Vec<CardId>,
        player_count: usize,
    },
    Marked {
        card_index: usize,
        number: u8,
        newly_marked: bool,
    },
    ClaimResult {
        has_won: bool,
        pattern: Option<String>,
        status: ParticipantStatus,
        winning_amount: Option<Amount>,
    },
    RoomState {
        room: RoomSummary,
        called: Vec<u8>,
    },

    /// `code` follows HTTP conventions: 400 validation, 404 unknown room,
    /// 409 conflict, 410 game not active, 503 unavailable.
    Error {
        code: u16,
        message: String,
    },
}

impl ServerMessage {
    /// Returns `true` for the events a room broadcasts to all members.
    pub fn is_room_event(&self) -> bool {
        matches!(
            self,
            Self::PlayerJoined { .. }
                | Self::GameStarted { .. }
                | Self::NumberCalled { .. }
                | Self::PlayerWon { .. }
                | Self::GameVoid { .. }
                | Self::PlayerLeft { .. }
        )
    }
}

// =========================================================================
// Tests
// =========================================================================
