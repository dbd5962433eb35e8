//! `BingoServer` builder and server loop.
//!
//! This is the entry point for running a bingo server. It ties together
//! all the layers: transport → protocol → room engine → hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bingo_hub::BroadcastHub;
use bingo_protocol::{Codec, JsonCodec};
use bingo_room::{RoomConfig, RoomManager, RoomStore, Wallet};
use bingo_transport::{Transport, WebSocketTransport};

use crate::BingoError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) manager: Arc<RoomManager>,
    pub(crate) codec: C,
    /// How long a new connection has to send its `hello`.
    pub(crate) hello_timeout: Duration,
    /// A connection silent for this long is dropped. Clients ping.
    pub(crate) read_timeout: Duration,
}

/// Builder for configuring and starting a bingo server.
///
/// # Example
///
/// ```rust,ignore
/// use bingo::prelude::*;
///
/// let server = BingoServer::builder()
///     .bind("0.0.0.0:8080")
///     .room_config(RoomConfig::default())
///     .build(wallet, store)
///     .await?;
/// server.run().await
/// ```
pub struct BingoServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    hello_timeout: Duration,
    read_timeout: Duration,
}

impl BingoServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            hello_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    pub fn hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Binds the listener and wires the room manager to `wallet` and
    /// `store`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(
        self,
        wallet: Arc<dyn Wallet>,
        store: Arc<dyn RoomStore>,
    ) -> Result<BingoServer<JsonCodec>, BingoError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let hub = Arc::new(BroadcastHub::new());
        let manager = Arc::new(RoomManager::new(self.room_config, hub, wallet, store));

        let state = Arc::new(ServerState {
            manager,
            codec: JsonCodec,
            hello_timeout: self.hello_timeout,
            read_timeout: self.read_timeout,
        });

        Ok(BingoServer { transport, state })
    }
}

impl Default for BingoServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound bingo server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BingoServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl BingoServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> BingoServerBuilder {
        BingoServerBuilder::new()
    }
}

impl<C: Codec> BingoServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BingoError> {
        Ok(self.transport.local_addr()?)
    }

    /// The room manager, for creating rooms and running the reaper.
    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.state.manager
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), BingoError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "bingo server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
