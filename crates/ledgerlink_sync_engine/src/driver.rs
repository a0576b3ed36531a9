//! WebSocket relay driver.
//!
//! Runs a [`Node`] on one task: relay frames, connect attempts, timers and
//! local commands are all handled in a single `select!` loop, so the node
//! is never touched concurrently. A connect attempt in flight never holds
//! up shutdown or commands.

use crate::connection::{optional_sleep, ReconnectTimer};
use crate::error::{SyncError, SyncResult};
use crate::node::{Node, NodeStats};
use futures_util::{SinkExt, StreamExt};
use ledgerlink_ledger::{Block, SignedEvent};
use ledgerlink_sync_protocol::Outbound;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsResult = Result<WsMessage, tokio_tungstenite::tungstenite::Error>;
type Connecting = Pin<Box<dyn Future<Output = SyncResult<RelaySocket>> + Send>>;

/// Work submitted to a running node.
#[derive(Debug)]
pub enum NodeCommand {
    /// Store, persist and broadcast a locally produced block.
    PublishBlock(Block, oneshot::Sender<SyncResult<bool>>),
    /// Store, persist and broadcast a locally produced event.
    PublishEvent(SignedEvent, oneshot::Sender<SyncResult<bool>>),
    /// Count entries seen by a replicated store sweep.
    RecordStoreUpdates(u64),
}

/// Cloneable handle to a running [`RelayDriver`].
#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
    stats: watch::Receiver<NodeStats>,
}

impl NodeHandle {
    /// Publishes a locally produced block.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Shutdown`] if the driver has stopped, or the
    /// node's own rejection.
    pub async fn publish_block(&self, block: Block) -> SyncResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.submit(NodeCommand::PublishBlock(block, tx)).await?;
        rx.await.map_err(|_| SyncError::Shutdown)?
    }

    /// Publishes a locally produced event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Shutdown`] if the driver has stopped.
    pub async fn publish_event(&self, event: SignedEvent) -> SyncResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.submit(NodeCommand::PublishEvent(event, tx)).await?;
        rx.await.map_err(|_| SyncError::Shutdown)?
    }

    /// Adds sweep results to the node's counters.
    pub async fn record_store_updates(&self, count: u64) -> SyncResult<()> {
        self.submit(NodeCommand::RecordStoreUpdates(count)).await
    }

    async fn submit(&self, command: NodeCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::Shutdown)
    }

    /// Latest status snapshot.
    pub fn stats(&self) -> NodeStats {
        self.stats.borrow().clone()
    }

    /// Watches status snapshots.
    pub fn watch_stats(&self) -> watch::Receiver<NodeStats> {
        self.stats.clone()
    }
}

/// Owns a [`Node`] and its relay socket.
pub struct RelayDriver {
    node: Node,
    commands: mpsc::Receiver<NodeCommand>,
    stats: watch::Sender<NodeStats>,
}

impl RelayDriver {
    /// Wraps a node, returning the driver and a handle to it.
    pub fn new(node: Node) -> (Self, NodeHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (stats_tx, stats_rx) = watch::channel(node.stats());
        let driver = Self {
            node,
            commands: command_rx,
            stats: stats_tx,
        };
        let handle = NodeHandle {
            commands: command_tx,
            stats: stats_rx,
        };
        (driver, handle)
    }

    /// Runs until `shutdown` resolves, then flushes the stores, closes the
    /// socket and hands the node back.
    ///
    /// Connection failures are retried forever with capped backoff.
    pub async fn run<F>(mut self, shutdown: F) -> Node
    where
        F: Future<Output = ()>,
    {
        let config = self.node.config().clone();
        let mut socket: Option<RelaySocket> = None;
        let mut reconnect = ReconnectTimer::new();
        let mut settle: Option<Pin<Box<Sleep>>> = None;
        let mut connecting: Option<Connecting> = None;
        let mut keepalive = interval_at(
            Instant::now() + config.keepalive_interval,
            config.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut monitor = interval_at(
            Instant::now() + config.monitor_interval,
            config.monitor_interval,
        );
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        reconnect.schedule(Duration::ZERO);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = reconnect.fired() => {
                    self.node.begin_connect();
                    connecting = Some(connect(config.relay_url.clone(), config.connect_timeout));
                }
                result = pending_connect(&mut connecting) => {
                    connecting = None;
                    match result {
                        Ok(ws) => {
                            socket = Some(ws);
                            self.node.on_open();
                            settle = Some(Box::pin(sleep(config.sync_settle_delay)));
                        }
                        Err(e) => {
                            debug!(error = %e, "connect failed");
                            reconnect.schedule(self.node.on_close());
                        }
                    }
                }
                frame = next_frame(&mut socket) => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.node.handle_frame(&text),
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                        socket = None;
                        settle = None;
                        reconnect.schedule(self.node.on_close());
                    }
                    Some(Ok(_)) => {}
                },
                _ = optional_sleep(&mut settle) => {
                    settle = None;
                    self.node.complete_handshake();
                }
                _ = keepalive.tick() => self.node.keepalive(),
                _ = monitor.tick() => self.node.check_head(),
                Some(command) = self.commands.recv() => self.apply(command),
            }

            let frames = self.node.drain_outgoing();
            self.stats.send_replace(self.node.stats());
            if let Some(ws) = socket.as_mut() {
                write_frames(ws, frames).await;
            }
        }

        info!("shutting down");
        match self.node.flush() {
            Ok(()) => info!("state flushed"),
            Err(e) => warn!(error = %e, "could not flush state"),
        }
        if let Some(mut ws) = socket {
            let _ = ws.close(None).await;
        }
        self.stats.send_replace(self.node.stats());
        self.node
    }

    fn apply(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::PublishBlock(block, reply) => {
                let result = self.node.publish_block(block);
                if let Err(e) = &result {
                    warn!(error = %e, "refusing to publish block");
                }
                let _ = reply.send(result);
            }
            NodeCommand::PublishEvent(event, reply) => {
                let _ = reply.send(self.node.publish_event(event));
            }
            NodeCommand::RecordStoreUpdates(count) => self.node.record_store_updates(count),
        }
    }
}

/// One bounded connect attempt, polled alongside everything else.
fn connect(url: String, limit: Duration) -> Connecting {
    Box::pin(async move {
        match timeout(limit, connect_async(url.as_str())).await {
            Ok(Ok((ws, _))) => Ok(ws),
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout),
        }
    })
}

async fn pending_connect(slot: &mut Option<Connecting>) -> SyncResult<RelaySocket> {
    match slot.as_mut() {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<RelaySocket>) -> Option<WsResult> {
    match socket.as_mut() {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

/// Writes frames in order. A failed write is dropped; the read side sees
/// the close and drives the reconnect.
async fn write_frames(ws: &mut RelaySocket, frames: Vec<Outbound>) {
    for outbound in frames {
        let text = match outbound.to_frame() {
            Ok(text) => text,
            Err(e) => {
                warn!(frame = outbound.label(), error = %e, "could not encode frame");
                continue;
            }
        };
        if let Err(e) = ws.send(WsMessage::Text(text)).await {
            trace!(frame = outbound.label(), error = %e, "send failed");
            return;
        }
    }
}
