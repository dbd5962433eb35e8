//! Live-connection registry and room event fan-out for Bingo Hall.
//!
//! The hub knows which connection currently speaks for each user in each
//! room. Room engines hand it [`ServerMessage`](bingo_protocol::ServerMessage)
//! events; it pushes them onto every member's [`Outlet`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Room engine (above)  ← emits events in order
//!     ↓
//! Broadcast hub (this crate)  ← room → user → outlet
//!     ↓
//! Connection writer task (below)  ← drains one outlet onto one socket
//! ```
//!
//! An outlet is an unbounded FIFO. Enqueueing never awaits, so a slow
//! client can't stall a room, and each connection sees events in exactly
//! the order the room emitted them. Nothing here returns an error: a
//! closed or missing outlet is counted in [`HubStats`] and skipped.

mod hub;

pub use hub::{BroadcastHub, HubStats, Outbound, Outlet};
