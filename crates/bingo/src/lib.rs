//! # Bingo Hall
//!
//! Live multi-player bingo over WebSockets.
//!
//! The server is authoritative: clients send marks and claims, but the
//! draw order, the marks that count, and win detection all live in the
//! room engine ([`bingo_room`]). This crate adds the connection layer on
//! top: one task per socket, a `hello` frame binding it to a room and a
//! user, and a writer that forwards room events from the hub.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bingo::prelude::*;
//!
//! # async fn run() -> Result<(), BingoError> {
//! let server = BingoServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(
//!         Arc::new(MemoryWallet::with_open_accounts(1_000)),
//!         Arc::new(MemoryStore::new()),
//!     )
//!     .await?;
//! server.manager().create_room(RoomSettings::new("Main hall", 10));
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::BingoError;
pub use server::{BingoServer, BingoServerBuilder};

/// Everything needed to stand up a server and talk to it.
pub mod prelude {
    pub use crate::{BingoError, BingoServer, BingoServerBuilder};
    pub use bingo_game::{Card, Letter, WinLine};
    pub use bingo_hub::BroadcastHub;
    pub use bingo_protocol::{
        Amount, CardId, CardView, ClientMessage, Codec, JsonCodec, ParticipantStatus, RoomId,
        RoomStatus, RoomSummary, ServerMessage, UserId, VoidReason,
    };
    pub use bingo_room::{
        ErrorKind, MemoryStore, MemoryWallet, RoomConfig, RoomError, RoomManager, RoomSettings,
        RoomStore, Wallet,
    };
}
