//! Room engine for Bingo Hall.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! participants, draw order, and call clock. Everything that mutates a
//! room goes through its command channel, so calls, marks, and claims are
//! strictly ordered per room.
//!
//! # Key types
//!
//! - [`RoomManager`]: creates, reaps, and recovers rooms; routes requests
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Wallet`]: the stake/payout seam, with idempotent [`TxnId`]s
//! - [`RoomStore`]: the persistence seam, written behind each actor
//! - [`RoomConfig`]: process-wide timings and limits

mod config;
mod error;
mod manager;
mod participant;
mod room;
mod store;
mod wallet;
mod writer;

pub use config::{RoomConfig, RoomSettings};
pub use error::{ErrorKind, RoomError};
pub use manager::{ReapReport, RecoveryReport, RoomManager};
pub use participant::ParticipantView;
pub use room::{ClaimReceipt, JoinReceipt, RoomHandle, RoomSnapshot};
pub use store::{CardRecord, MemoryStore, Outcome, ParticipantRecord, RoomRecord, RoomStore, StoreError};
pub use wallet::{MemoryWallet, TxnId, Wallet, WalletError};
