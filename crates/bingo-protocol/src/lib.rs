//! Wire protocol for Bingo Hall.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Identifiers** ([`UserId`], [`RoomId`], [`CardId`]) — newtypes so a
//!   room id can never be passed where a user id is expected.
//! - **Statuses** ([`RoomStatus`], [`ParticipantStatus`]) — the two
//!   lifecycle state machines, as they appear on the wire.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]) — flat JSON
//!   objects tagged by a `type` field.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Room engine
//! Room engine → Protocol (ServerMessage) → Hub → Transport (bytes)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Amount, CardId, CardView, ClientMessage, ParticipantStatus, PlayerSummary,
    RoomId, RoomStatus, RoomSummary, ServerMessage, UserId, VoidReason,
};
