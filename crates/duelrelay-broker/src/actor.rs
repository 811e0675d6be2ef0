//! Broker actor: one Tokio task that owns the [`Broker`].
//!
//! Every connection handler talks to the broker through a cloned
//! [`BrokerHandle`]. Commands go through a single mpsc channel, so the
//! actor is the only writer of the waiting pool, room table and registry,
//! and each read-modify-write runs to completion before the next command.
//! Commands sent by one handler are processed in the order it sent them.

use std::future;
use std::time::{Duration, Instant};

use duelrelay_protocol::{Identify, RelayEvent};
use duelrelay_registry::ClientSender;
use duelrelay_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Interval;

use crate::{Broker, BrokerConfig, BrokerError, BrokerStats, Matched};

/// Lower bound on how often the waiting pool is swept for timeouts.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(50);

/// Commands sent to the broker actor.
///
/// The `oneshot::Sender` in some variants is the reply channel.
pub(crate) enum BrokerCommand {
    Identify {
        conn: ConnectionId,
        hello: Identify,
        sender: ClientSender,
        reply: oneshot::Sender<Result<Matched, BrokerError>>,
    },

    /// Fire-and-forget: relay misses are never reported back.
    Relay {
        conn: ConnectionId,
        event: RelayEvent,
    },

    Disconnect {
        conn: ConnectionId,
    },

    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },

    Shutdown,
}

/// Handle to the running broker actor.
///
/// Cheap to clone: it's an `mpsc::Sender` wrapper.
#[derive(Clone)]
pub struct BrokerHandle {
    sender: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    /// Submits an identify frame for `conn` and waits for the verdict.
    ///
    /// The client has already been sent its `waiting`/`connected`/`error`
    /// reply on `sender` by the time this returns.
    pub async fn identify(
        &self,
        conn: ConnectionId,
        hello: Identify,
        sender: ClientSender,
    ) -> Result<Matched, BrokerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BrokerCommand::Identify {
            conn,
            hello,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| BrokerError::Unavailable)?
    }

    /// Queues a game event from `conn` for relay.
    pub async fn relay(
        &self,
        conn: ConnectionId,
        event: RelayEvent,
    ) -> Result<(), BrokerError> {
        self.send(BrokerCommand::Relay { conn, event }).await
    }

    /// Reports that `conn` closed.
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), BrokerError> {
        self.send(BrokerCommand::Disconnect { conn }).await
    }

    /// Returns the current counters.
    pub async fn stats(&self) -> Result<BrokerStats, BrokerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BrokerCommand::Stats { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| BrokerError::Unavailable)
    }

    /// Tells the actor to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        self.send(BrokerCommand::Shutdown).await
    }

    async fn send(&self, cmd: BrokerCommand) -> Result<(), BrokerError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| BrokerError::Unavailable)
    }
}

/// The actor state. Runs inside a Tokio task.
struct BrokerActor {
    broker: Broker,
    receiver: mpsc::Receiver<BrokerCommand>,
}

impl BrokerActor {
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        tracing::info!(
            teardown = %self.broker.config().teardown,
            wait_timeout = ?self.broker.config().wait_timeout,
            "broker started"
        );

        let mut sweep = self.broker.config().wait_timeout.map(|timeout| {
            tokio::time::interval((timeout / 4).max(MIN_SWEEP_PERIOD))
        });

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                _ = next_sweep(&mut sweep) => {
                    self.broker.expire_waiting(Instant::now());
                }
            }
        }

        tracing::info!(stats = ?self.broker.stats(), "broker stopped");
    }

    /// Applies one command. Returns `false` on shutdown.
    fn handle(&mut self, cmd: BrokerCommand) -> bool {
        match cmd {
            BrokerCommand::Identify {
                conn,
                hello,
                sender,
                reply,
            } => {
                let result = self.broker.identify(conn, hello, sender);
                let _ = reply.send(result);
            }
            BrokerCommand::Relay { conn, event } => {
                let outcome = self.broker.relay(conn, event);
                tracing::trace!(%conn, ?outcome, "relay handled");
            }
            BrokerCommand::Disconnect { conn } => {
                let departure = self.broker.disconnect(conn);
                tracing::debug!(%conn, ?departure, "disconnect handled");
            }
            BrokerCommand::Stats { reply } => {
                let _ = reply.send(self.broker.stats());
            }
            BrokerCommand::Shutdown => {
                tracing::info!("broker shutting down");
                return false;
            }
        }
        true
    }
}

/// Resolves on the next sweep tick, or never if timeouts are disabled.
async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Spawns a broker actor with random room ids.
pub fn spawn_broker(config: BrokerConfig) -> BrokerHandle {
    spawn_broker_with(Broker::new(config))
}

/// Spawns an actor around an already-built broker.
///
/// `channel_size` from the broker's config bounds the command queue.
pub fn spawn_broker_with(broker: Broker) -> BrokerHandle {
    let (tx, rx) = mpsc::channel(broker.config().channel_size.max(1));
    let actor = BrokerActor {
        broker,
        receiver: rx,
    };
    tokio::spawn(actor.run());
    BrokerHandle { sender: tx }
}
