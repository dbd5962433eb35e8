//! Per-connection handler: hello, hub registration, and request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `hello` → resolve the room, bind the user
//!   2. Register an outlet in the hub, so no event is missed from here on
//!   3. Send `welcome` with the room's status and call log, then spawn the
//!      writer that drains the outlet (skipping calls `welcome` covered)
//!   4. Loop: receive client messages → route to the room manager
//!   5. On exit: unregister (if still current) and broadcast `player_left`

use std::sync::Arc;

use bingo_hub::{Outbound, Outlet};
use bingo_protocol::{
    ClientMessage, Codec, ProtocolError, RoomId, ServerMessage, UserId,
};
use bingo_room::RoomError;
use bingo_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::BingoError;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), BingoError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    // --- Step 1: hello ---
    let (room_id, user_id) = match receive_hello(&conn, &state).await {
        Ok(binding) => binding,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };

    // --- Step 2: hub registration ---
    let hub = Arc::clone(state.manager.hub());
    let (outlet, outbound) = Outlet::channel(conn_id);
    if let Some(retired) = hub.register(room_id, user_id, outlet) {
        tracing::info!(%room_id, %user_id, old = %retired.connection_id(), new = %conn_id, "connection replaced");
    }

    // --- Step 3: welcome, then the writer ---
    let already_called = match send_welcome(&conn, &state, room_id, user_id).await {
        Ok(count) => count,
        Err(e) => {
            leave(&state, room_id, user_id, conn_id);
            let _ = conn.close().await;
            return Err(e);
        }
    };
    let writer = tokio::spawn(drain_outlet(
        Arc::clone(&conn),
        outbound,
        Arc::clone(&state),
        already_called,
    ));
    tracing::info!(%conn_id, %room_id, %user_id, "user connected");

    // --- Step 4: request loop ---
    let result = serve(&conn, &state, room_id, user_id).await;

    // --- Step 5: cleanup ---
    leave(&state, room_id, user_id, conn_id);
    // The hub held the only sender; the writer drains what's queued and
    // closes the socket.
    let _ = writer.await;
    tracing::info!(%conn_id, %room_id, %user_id, "user disconnected");

    result
}

/// Drops this connection from the hub and tells the room, unless a newer
/// connection already took over for the user.
fn leave<C: Codec>(state: &ServerState<C>, room_id: RoomId, user_id: UserId, conn_id: ConnectionId) {
    let hub = state.manager.hub();
    if hub.unregister_connection(room_id, user_id, conn_id) {
        hub.broadcast(room_id, ServerMessage::PlayerLeft { user_id });
    }
}

/// Reads the first frame, which must be `hello` naming a hosted room.
async fn receive_hello<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> Result<(RoomId, UserId), BingoError> {
    let data = match tokio::time::timeout(state.hello_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before hello".into()).into());
        }
        Ok(Err(e)) => return Err(BingoError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("hello timed out".into()).into());
        }
    };

    let (room_id, user_id) = match state.codec.decode::<ClientMessage>(&data) {
        Ok(ClientMessage::Hello { room_id, user_id }) => (room_id, user_id),
        Ok(_) => {
            send_error(conn, &state.codec, 400, "expected hello").await?;
            return Err(ProtocolError::InvalidMessage("first message must be hello".into()).into());
        }
        Err(e) => {
            send_error(conn, &state.codec, 400, &format!("invalid message: {e}")).await?;
            return Err(e.into());
        }
    };

    if let Err(e) = state.manager.handle(room_id) {
        send_room_error(conn, &state.codec, &e).await?;
        return Err(e.into());
    }
    Ok((room_id, user_id))
}

/// Sends `welcome` straight to the socket, ahead of any queued event.
///
/// Returns how many numbers the welcome's call log holds.
async fn send_welcome<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<usize, BingoError> {
    let snapshot = state.manager.room_info(room_id).await?;
    let already_called = snapshot.called.len();
    send(
        conn,
        &state.codec,
        &ServerMessage::Welcome {
            room_id,
            user_id,
            status: snapshot.status,
            called: snapshot.called,
        },
    )
    .await?;
    Ok(already_called)
}

/// Serves requests until the client leaves.
async fn serve<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<(), BingoError> {
    loop {
        let data = match tokio::time::timeout(state.read_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%user_id, "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::debug!(%user_id, error = %e, "recv error");
                return Ok(());
            }
            Err(_) => {
                tracing::info!(%user_id, "connection timed out");
                return Ok(());
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "failed to decode message");
                send_error(conn, &state.codec, 400, &format!("invalid message: {e}")).await?;
                continue;
            }
        };

        match msg {
            ClientMessage::Disconnect { reason } => {
                tracing::info!(%user_id, %reason, "client disconnected");
                return Ok(());
            }
            ClientMessage::Hello { .. } => {
                send_error(conn, &state.codec, 400, "already greeted").await?;
            }
            request => match dispatch(state, room_id, user_id, request).await {
                Ok(Some(reply)) => send(conn, &state.codec, &reply).await?,
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(%room_id, %user_id, error = %e, "request rejected");
                    send_room_error(conn, &state.codec, &e).await?;
                }
            },
        }
    }
}

/// Routes one request to the room manager and builds its reply.
///
/// `start_game` has no direct reply; `game_started` reaches every member
/// of the room, this client included, through the hub.
async fn dispatch<C: Codec>(
    state: &ServerState<C>,
    room_id: RoomId,
    user_id: UserId,
    msg: ClientMessage,
) -> Result<Option<ServerMessage>, RoomError> {
    let manager = &state.manager;
    let reply = match msg {
        ClientMessage::Ping => ServerMessage::Pong,
        ClientMessage::StatusCheck => ServerMessage::ConnectionStatus {
            status: "connected".into(),
            user_id,
        },
        ClientMessage::ListRooms => ServerMessage::RoomList {
            rooms: manager.list_rooms().await,
        },
        ClientMessage::GenerateCards { count } => ServerMessage::Cards {
            cards: manager.generate_cards(user_id, count).await?,
        },
        ClientMessage::MyCards => ServerMessage::Cards {
            cards: manager.my_cards(user_id).await?,
        },
        ClientMessage::Join { card_ids } => {
            let receipt = manager.join(room_id, user_id, card_ids).await?;
            ServerMessage::Joined {
                room_id: receipt.room_id,
                card_ids: receipt.card_ids,
                player_count: receipt.player_count,
            }
        }
        ClientMessage::Mark { card_index, number } => {
            let newly_marked = manager.mark(room_id, user_id, card_index, number).await?;
            ServerMessage::Marked {
                card_index,
                number,
                newly_marked,
            }
        }
        ClientMessage::ClaimWin { card_index } => {
            let receipt = manager.claim_win(room_id, user_id, card_index).await?;
            ServerMessage::ClaimResult {
                has_won: receipt.has_won,
                pattern: receipt.pattern.map(|line| line.to_string()),
                status: receipt.status,
                winning_amount: receipt.winning_amount,
            }
        }
        ClientMessage::StartGame => {
            manager.start(room_id).await?;
            return Ok(None);
        }
        ClientMessage::RoomState => {
            let snapshot = manager.room_info(room_id).await?;
            ServerMessage::RoomState {
                room: snapshot.summary(),
                called: snapshot.called,
            }
        }
        ClientMessage::Hello { .. } | ClientMessage::Disconnect { .. } => return Ok(None),
    };
    Ok(Some(reply))
}

/// Writer task: forwards hub events to the socket in queue order.
///
/// Calls numbered up to `already_called` were queued before the welcome
/// snapshot was taken and are already in its call log; they are dropped.
/// Ends when the hub drops the outlet (unregistered or replaced by a newer
/// connection) or the socket fails, then closes the socket.
async fn drain_outlet<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    state: Arc<ServerState<C>>,
    already_called: usize,
) {
    while let Some(msg) = outbound.recv().await {
        if let ServerMessage::NumberCalled { total_called, .. } = msg.as_ref() {
            if *total_called <= already_called {
                continue;
            }
        }
        if let Err(e) = send(&conn, &state.codec, &msg).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "event delivery failed");
            break;
        }
    }
    let _ = conn.close().await;
}

async fn send(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    msg: &ServerMessage,
) -> Result<(), BingoError> {
    let bytes = codec.encode(msg)?;
    conn.send(&bytes).await?;
    Ok(())
}

async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
) -> Result<(), BingoError> {
    send(
        conn,
        codec,
        &ServerMessage::Error {
            code,
            message: message.to_string(),
        },
    )
    .await
}

async fn send_room_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    err: &RoomError,
) -> Result<(), BingoError> {
    send_error(conn, codec, err.kind().code(), &err.to_string()).await
}
