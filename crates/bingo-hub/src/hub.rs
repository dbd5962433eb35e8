//! The broadcast hub: room → user → outlet.
//!
//! # Concurrency note
//!
//! Both maps are `DashMap`s, so registrations and broadcasts for unrelated
//! rooms land on different shards and don't contend. No method holds a
//! guard on one map while touching the other, and no guard is ever held
//! across an `.await` (there are none: outlets are unbounded senders).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bingo_protocol::{RoomId, ServerMessage, UserId};
use bingo_transport::ConnectionId;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// What an outlet carries. One `Arc` per broadcast, shared by all members.
pub type Outbound = Arc<ServerMessage>;

// ---------------------------------------------------------------------------
// Outlet
// ---------------------------------------------------------------------------

/// The sending half of one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outlet {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outlet {
    pub fn new(conn: ConnectionId, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { conn, tx }
    }

    /// Creates an outlet together with the receiver its writer drains.
    pub fn channel(conn: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(conn, tx), rx)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    /// `true` once the writer has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn deliver(&self, msg: &Outbound) -> bool {
        self.tx.send(Arc::clone(msg)).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters since the hub was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Messages enqueued onto a live outlet.
    pub delivered: u64,
    /// Enqueue attempts that found the outlet closed.
    pub failed: u64,
    /// Closed outlets removed during broadcast.
    pub pruned: u64,
    /// Direct sends dropped because the user had no connection.
    pub missed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    pruned: AtomicU64,
    missed: AtomicU64,
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

/// Tracks live connections per room and per user.
///
/// A user has at most one current connection. Registering again (page
/// reload, second tab, another room) retires the previous outlet: it is
/// removed and handed back to the caller, who may close it.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    rooms: DashMap<RoomId, HashMap<UserId, Outlet>>,
    /// Which room each user's current connection is bound to.
    users: DashMap<UserId, RoomId>,
    counters: Counters,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `outlet` as `user`'s connection in `room`.
    ///
    /// Returns the outlet it displaced, if any.
    pub fn register(&self, room: RoomId, user: UserId, outlet: Outlet) -> Option<Outlet> {
        let conn = outlet.connection_id();
        let previous_room = self.users.insert(user, room);

        let mut retired = match previous_room {
            Some(prev) if prev != room => self.remove_member(prev, user, None),
            _ => None,
        };
        if let Some(old) = self.rooms.entry(room).or_default().insert(user, outlet) {
            retired = Some(old);
        }

        match &retired {
            Some(old) => tracing::debug!(
                room_id = %room, user_id = %user, %conn,
                retired = %old.connection_id(),
                "connection replaced"
            ),
            None => tracing::debug!(room_id = %room, user_id = %user, %conn, "connection registered"),
        }
        retired
    }

    /// Removes `user`'s connection from `room`, whichever it is.
    pub fn unregister(&self, room: RoomId, user: UserId) -> Option<Outlet> {
        let removed = self.remove_member(room, user, None)?;
        self.users.remove_if(&user, |_, bound| *bound == room);
        tracing::debug!(room_id = %room, user_id = %user, "connection unregistered");
        Some(removed)
    }

    /// Removes `user`'s connection from `room` only if it is still `conn`.
    ///
    /// Connection handlers call this on exit, so a socket that was already
    /// replaced cannot evict its replacement. Returns `true` if removed.
    pub fn unregister_connection(&self, room: RoomId, user: UserId, conn: ConnectionId) -> bool {
        if self.remove_member(room, user, Some(conn)).is_none() {
            return false;
        }
        self.users.remove_if(&user, |_, bound| *bound == room);
        tracing::debug!(room_id = %room, user_id = %user, %conn, "connection unregistered");
        true
    }

    /// Enqueues `msg` on every outlet in `room`. Returns how many took it.
    ///
    /// Closed outlets are counted, logged, and pruned. Never fails.
    pub fn broadcast(&self, room: RoomId, msg: ServerMessage) -> usize {
        let msg = Arc::new(msg);
        let mut delivered = 0usize;
        let mut dead = Vec::new();

        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.retain(|user, outlet| {
                if outlet.deliver(&msg) {
                    delivered += 1;
                    true
                } else {
                    dead.push((*user, outlet.connection_id()));
                    false
                }
            });
        }

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if !dead.is_empty() {
            self.counters
                .failed
                .fetch_add(dead.len() as u64, Ordering::Relaxed);
            self.counters
                .pruned
                .fetch_add(dead.len() as u64, Ordering::Relaxed);
            for (user, conn) in &dead {
                tracing::warn!(room_id = %room, user_id = %user, %conn, "outlet closed, pruned");
                self.users.remove_if(user, |_, bound| *bound == room);
            }
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
        delivered
    }

    /// Sends `msg` to `user`'s current connection, wherever it is bound.
    ///
    /// Best-effort: a user with no connection, or whose writer is gone, is
    /// counted and logged and the message is dropped. Returns whether it
    /// was enqueued.
    pub fn send_direct(&self, user: UserId, msg: ServerMessage) -> bool {
        let outlet = self.users.get(&user).map(|bound| *bound).and_then(|room| {
            self.rooms
                .get(&room)
                .and_then(|members| members.get(&user).cloned())
        });
        let Some(outlet) = outlet else {
            self.counters.missed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id = %user, "direct send to unconnected user dropped");
            return false;
        };

        if outlet.deliver(&Arc::new(msg)) {
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id = %user, conn = %outlet.connection_id(), "direct send to closed outlet dropped");
            false
        }
    }

    /// Live connections in `room`.
    pub fn connection_count(&self, room: RoomId) -> usize {
        self.rooms.get(&room).map_or(0, |members| members.len())
    }

    /// Rooms with at least one live connection.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// The room `user`'s current connection is bound to.
    pub fn room_of(&self, user: UserId) -> Option<RoomId> {
        self.users.get(&user).map(|bound| *bound)
    }

    pub fn is_connected(&self, room: RoomId, user: UserId) -> bool {
        self.rooms
            .get(&room)
            .is_some_and(|members| members.contains_key(&user))
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            pruned: self.counters.pruned.load(Ordering::Relaxed),
            missed: self.counters.missed.load(Ordering::Relaxed),
        }
    }

    /// Removes one member; with `only`, only if that connection is current.
    /// Drops the room entry once it is empty.
    fn remove_member(&self, room: RoomId, user: UserId, only: Option<ConnectionId>) -> Option<Outlet> {
        let removed = {
            let mut members = self.rooms.get_mut(&room)?;
            match (only, members.get(&user)) {
                (Some(conn), Some(current)) if current.connection_id() != conn => None,
                (_, Some(_)) => members.remove(&user),
                (_, None) => None,
            }
        };
        if removed.is_some() {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
        removed
    }
}

// =========================================================================
// Tests
// =========================================================================
