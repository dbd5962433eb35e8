//! Error types for the room layer.

use bingo_protocol::{CardId, ParticipantStatus, RoomId, RoomStatus, UserId};

use crate::store::StoreError;
use crate::wallet::WalletError;

/// Coarse classification of a [`RoomError`], for mapping onto replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The room id doesn't resolve.
    NotFound,
    /// The request itself is malformed or refers to something invalid.
    Validation,
    /// The request is valid but collides with current state.
    Conflict,
    /// The room or participant is no longer in play.
    NotActive,
    /// A dependency (room actor, wallet, store) didn't answer.
    Unavailable,
}

impl ErrorKind {
    /// HTTP-style status code used in `error` replies.
    pub fn code(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::NotActive => 410,
            Self::Unavailable => 503,
        }
    }
}

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// Also returned while the user's previous join is still settling.
    #[error("user {user} already joined room {room}")]
    AlreadyJoined { user: UserId, room: RoomId },

    #[error("user {user} is not a participant in room {room}")]
    NotParticipant { user: UserId, room: RoomId },

    #[error("card {0} does not exist")]
    UnknownCard(CardId),

    #[error("card {card} does not belong to user {user}")]
    CardNotOwned { card: CardId, user: UserId },

    #[error("invalid card selection: {0}")]
    InvalidCardSelection(String),

    #[error("card index {index} out of range ({cards} cards held)")]
    CardIndexOutOfRange { index: usize, cards: usize },

    #[error("{0} is not a bingo number")]
    InvalidNumber(u8),

    #[error("number {0} has not been called")]
    NumberNotDrawn(u8),

    #[error("number {0} is not on this card")]
    NumberNotOnCard(u8),

    #[error("cannot generate {requested} cards (limit {max})")]
    TooManyCards { requested: usize, max: usize },

    #[error("room {room} is not accepting joins ({status})")]
    NotJoinable { room: RoomId, status: RoomStatus },

    #[error("room {room} cannot start from {status}")]
    CannotStart { room: RoomId, status: RoomStatus },

    #[error("room {0} has no participants")]
    NoParticipants(RoomId),

    #[error("room {room} is not in play ({status})")]
    NotActive { room: RoomId, status: RoomStatus },

    #[error("user {user} is {status}")]
    ParticipantFinished { user: UserId, status: ParticipantStatus },

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// The room started (or went away) while the stake debit was in
    /// flight. The stake has been refunded.
    #[error("room {0} started before the join completed")]
    ReservationLapsed(RoomId),

    #[error("room {0} still has a game or connections")]
    StillLive(RoomId),

    #[error("room {0} has no outstanding payout")]
    NothingToSettle(RoomId),

    #[error("user {0} has no wallet account")]
    UnknownUser(UserId),

    #[error("wallet did not answer in time")]
    WalletTimeout,

    #[error(transparent)]
    Wallet(WalletError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The room actor is gone or its command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotParticipant { .. }
            | Self::UnknownCard(_)
            | Self::CardNotOwned { .. }
            | Self::InvalidCardSelection(_)
            | Self::CardIndexOutOfRange { .. }
            | Self::InvalidNumber(_)
            | Self::NumberNotDrawn(_)
            | Self::NumberNotOnCard(_)
            | Self::TooManyCards { .. }
            | Self::UnknownUser(_) => ErrorKind::Validation,
            Self::RoomFull(_)
            | Self::AlreadyJoined { .. }
            | Self::NotJoinable { .. }
            | Self::CannotStart { .. }
            | Self::NoParticipants(_)
            | Self::InsufficientFunds { .. }
            | Self::ReservationLapsed(_)
            | Self::StillLive(_)
            | Self::NothingToSettle(_) => ErrorKind::Conflict,
            Self::NotActive { .. } | Self::ParticipantFinished { .. } => ErrorKind::NotActive,
            Self::WalletTimeout | Self::Wallet(_) | Self::Store(_) | Self::Unavailable(_) => {
                ErrorKind::Unavailable
            }
        }
    }
}

impl From<WalletError> for RoomError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds { needed, available } => {
                Self::InsufficientFunds { needed, available }
            }
            WalletError::UnknownUser(user) => Self::UnknownUser(user),
            other => Self::Wallet(other),
        }
    }
}
