//! Per-relay connection lifecycle.
//!
//! [`ConnectionManager`] is the socket-free half: state, retry counter and
//! the offline queue. [`ReconnectTimer`] is the single timer slot the
//! driver arms after every close.

use crate::config::RetryConfig;
use ledgerlink_sync_protocol::Outbound;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};
use tracing::{debug, warn};

/// The state of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket is being opened.
    Connecting,
    /// Socket is open, handshake frames sent, initial sync pending.
    Handshaking,
    /// Handshake finished.
    Synced,
}

impl ConnectionState {
    /// Returns true if frames can be written.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Handshaking | ConnectionState::Synced)
    }

    /// Lowercase name for logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Synced => "synced",
        }
    }
}

/// Connection state, retry counter and offline queue for one relay.
#[derive(Debug)]
pub struct ConnectionManager {
    url: String,
    state: ConnectionState,
    attempt: u32,
    retry: RetryConfig,
    queue: VecDeque<Outbound>,
    max_queued: usize,
    dropped: u64,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    pub fn new(url: impl Into<String>, retry: RetryConfig, max_queued: usize) -> Self {
        Self {
            url: url.into(),
            state: ConnectionState::Disconnected,
            attempt: 0,
            retry,
            queue: VecDeque::new(),
            max_queued: max_queued.max(1),
            dropped: 0,
        }
    }

    /// Relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true if frames can be written.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Number of consecutive failed attempts.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Marks a connect attempt as started.
    pub fn begin_connect(&mut self) {
        debug!(url = %self.url, attempt = self.attempt, "connecting to relay");
        self.state = ConnectionState::Connecting;
    }

    /// Socket opened: resets the retry counter and hands back the queued
    /// broadcasts in their original order.
    pub fn on_open(&mut self) -> Vec<Outbound> {
        self.attempt = 0;
        self.state = ConnectionState::Handshaking;
        self.queue.drain(..).collect()
    }

    /// Initial sync request sent.
    pub fn on_synced(&mut self) {
        if self.state == ConnectionState::Handshaking {
            self.state = ConnectionState::Synced;
        }
    }

    /// Socket closed or failed to open. Returns the delay before the next
    /// attempt.
    pub fn on_close(&mut self) -> Duration {
        let delay = self.retry.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.state = ConnectionState::Disconnected;
        delay
    }

    /// Queues a broadcast for replay after the next handshake.
    ///
    /// When the queue is full the oldest entry is dropped.
    pub fn enqueue(&mut self, outbound: Outbound) {
        if self.queue.len() >= self.max_queued {
            self.queue.pop_front();
            self.dropped += 1;
            warn!(
                capacity = self.max_queued,
                dropped = self.dropped,
                "offline queue full, dropping oldest broadcast"
            );
        }
        self.queue.push_back(outbound);
    }

    /// Number of queued broadcasts.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// A single reconnect timer slot.
///
/// Scheduling replaces any pending timer, so at most one retry chain is
/// ever live.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ReconnectTimer {
    /// Creates an unarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer, canceling any pending one.
    pub fn schedule(&mut self, delay: Duration) {
        self.sleep = Some(Box::pin(sleep(delay)));
    }

    /// Disarms the timer.
    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    /// Returns true if a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Waits for the pending timer and disarms it. Never resolves when
    /// unarmed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.await;
                self.sleep = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Awaits an optional one-shot delay; never resolves when `None`.
pub(crate) fn optional_sleep(
    slot: &mut Option<Pin<Box<Sleep>>>,
) -> impl Future<Output = ()> + '_ {
    async move {
        match slot.as_mut() {
            Some(sleep) => sleep.await,
            None => std::future::pending::<()>().await,
        }
    }
}
