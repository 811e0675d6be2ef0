//! `DuelRelayServer` builder and server loop.
//!
//! This is the entry point for running a relay server. It ties together
//! all the layers: transport → protocol → broker.

use std::sync::Arc;
use std::time::Duration;

use duelrelay_broker::{BrokerConfig, BrokerHandle, spawn_broker};
use duelrelay_protocol::{Codec, JsonCodec};
use duelrelay_transport::{Incoming, Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::DuelRelayError;

/// Shared server state passed to each connection handler task.
///
/// The broker actor owns all matchmaking state, so nothing here needs a
/// lock.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) broker: BrokerHandle,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Option<Duration>,
}

/// Builder for configuring and starting a relay server.
///
/// # Example
///
/// ```rust,no_run
/// use duelrelay::prelude::*;
///
/// # async fn start() -> Result<(), DuelRelayError> {
/// let server = DuelRelayServer::builder()
///     .bind("0.0.0.0:8080")
///     .broker_config(BrokerConfig::default().with_teardown(TeardownPolicy::PartnerNotify))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuelRelayServerBuilder {
    bind_addr: String,
    broker_config: BrokerConfig,
    idle_timeout: Option<Duration>,
}

impl DuelRelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            broker_config: BrokerConfig::default(),
            idle_timeout: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the broker configuration.
    pub fn broker_config(mut self, config: BrokerConfig) -> Self {
        self.broker_config = config;
        self
    }

    /// Closes connections that send nothing for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Binds the listener and starts the broker actor.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<DuelRelayServer<JsonCodec>, DuelRelayError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        tracing::info!(
            teardown = %self.broker_config.teardown,
            wait_timeout = ?self.broker_config.wait_timeout,
            idle_timeout = ?self.idle_timeout,
            "server configured"
        );

        let state = Arc::new(ServerState {
            broker: spawn_broker(self.broker_config),
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(DuelRelayServer { transport, state })
    }
}

impl Default for DuelRelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A relay server bound to its listening address.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuelRelayServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl DuelRelayServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> DuelRelayServerBuilder {
        DuelRelayServerBuilder::new()
    }
}

impl<C: Codec> DuelRelayServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns a handle to the broker, e.g. for stats.
    pub fn broker(&self) -> BrokerHandle {
        self.state.broker.clone()
    }

    /// Runs the server accept loop.
    ///
    /// Each accepted stream finishes its handshake in its own task, then
    /// runs the connection handler there. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), DuelRelayError> {
        tracing::info!(addr = ?self.local_addr().ok(), "duelrelay server running");

        loop {
            match self.transport.accept().await {
                Ok(incoming) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = incoming.peer_addr();
                        let conn = match incoming.establish().await {
                            Ok(Some(conn)) => conn,
                            Ok(None) => return,
                            Err(e) if e.is_per_client() => {
                                tracing::debug!(%peer, error = %e, "client dropped before upgrade");
                                return;
                            }
                            Err(e) => {
                                tracing::warn!(%peer, error = %e, "handshake failed");
                                return;
                            }
                        };
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
