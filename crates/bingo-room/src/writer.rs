//! Write-behind persistence for one room.
//!
//! The room actor never awaits the store. It pushes [`StoreOp`]s onto an
//! ordered channel; a companion task applies them one by one. Failures are
//! logged and skipped so a flaky store can't stall a live game.

use std::sync::Arc;

use bingo_protocol::RoomId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::{ParticipantRecord, RoomRecord, RoomStore};

#[derive(Debug)]
pub(crate) enum StoreOp {
    SaveRoom(Box<RoomRecord>),
    SaveParticipant(Box<ParticipantRecord>),
    AppendCall(u8),
}

/// Sending side held by the room actor.
#[derive(Debug, Clone)]
pub(crate) struct StoreWriter {
    room_id: RoomId,
    tx: mpsc::UnboundedSender<StoreOp>,
}

impl StoreWriter {
    /// Spawns the writer task. It exits once every `StoreWriter` clone is
    /// dropped and the queue is drained.
    pub(crate) fn spawn(room_id: RoomId, store: Arc<dyn RoomStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(room_id, store, rx));
        (Self { room_id, tx }, task)
    }

    pub(crate) fn save_room(&self, record: RoomRecord) {
        self.push(StoreOp::SaveRoom(Box::new(record)));
    }

    pub(crate) fn save_participant(&self, record: ParticipantRecord) {
        self.push(StoreOp::SaveParticipant(Box::new(record)));
    }

    pub(crate) fn append_call(&self, number: u8) {
        self.push(StoreOp::AppendCall(number));
    }

    fn push(&self, op: StoreOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!(room_id = %self.room_id, "store writer gone, dropping write");
        }
    }
}

async fn run(room_id: RoomId, store: Arc<dyn RoomStore>, mut rx: mpsc::UnboundedReceiver<StoreOp>) {
    while let Some(op) = rx.recv().await {
        let result = match &op {
            StoreOp::SaveRoom(record) => store.save_room(record).await,
            StoreOp::SaveParticipant(record) => store.save_participant(record).await,
            StoreOp::AppendCall(number) => store.append_call(room_id, *number).await,
        };
        if let Err(e) = result {
            tracing::warn!(%room_id, error = %e, ?op, "store write failed");
        }
    }
    tracing::debug!(%room_id, "store writer drained");
}
