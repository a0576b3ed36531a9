//! Configuration for a sync node.

use ledgerlink_ledger::{Block, LedgerResult, DEFAULT_MAX_BLOCKS, DEFAULT_MAX_EVENTS};
use ledgerlink_sync_protocol::DEFAULT_ROOM;
use std::time::Duration;

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "wss://interpoll.onrender.com";
/// Default replicated store endpoint.
pub const DEFAULT_STORE_URL: &str = "https://interpoll2.onrender.com/gun";
/// Default HTTP API base.
pub const DEFAULT_API_URL: &str = "https://interpoll.onrender.com";

/// What a peer-supplied block must satisfy before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestPolicy {
    /// Structure and self-hash must check out. Linkage is audited afterwards.
    #[default]
    VerifyHash,
    /// Structure only. Everything else is left to the audit.
    AcceptAll,
}

impl IngestPolicy {
    /// Checks a structurally valid block against this policy.
    pub fn admit(&self, block: &Block) -> LedgerResult<()> {
        match self {
            IngestPolicy::VerifyHash => block.verify_hash(),
            IngestPolicy::AcceptAll => Ok(()),
        }
    }
}

/// Configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's peer id.
    pub peer_id: String,
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Replicated store URL, advertised to peers.
    pub store_url: String,
    /// HTTP API base URL, advertised to peers.
    pub api_url: String,
    /// Broadcast room.
    pub room: String,
    /// Ledger capacity.
    pub max_blocks: usize,
    /// Event log capacity.
    pub max_events: usize,
    /// Offline queue capacity.
    pub max_queued: usize,
    /// Ingestion gate for peer-supplied blocks.
    pub ingest_policy: IngestPolicy,
    /// Reconnect backoff.
    pub retry: RetryConfig,
    /// Keepalive ping interval.
    pub keepalive_interval: Duration,
    /// Downgrade monitor interval.
    pub monitor_interval: Duration,
    /// Delay between joining the room and asking for missing blocks.
    pub sync_settle_delay: Duration,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
}

impl NodeConfig {
    /// Creates a configuration with default endpoints and timings.
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            relay_url: DEFAULT_RELAY_URL.into(),
            store_url: DEFAULT_STORE_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            room: DEFAULT_ROOM.into(),
            max_blocks: DEFAULT_MAX_BLOCKS,
            max_events: DEFAULT_MAX_EVENTS,
            max_queued: 1_000,
            ingest_policy: IngestPolicy::default(),
            retry: RetryConfig::default(),
            keepalive_interval: Duration::from_secs(25),
            monitor_interval: Duration::from_secs(10),
            sync_settle_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(15),
        }
    }

    /// Sets the relay URL.
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    /// Sets the replicated store URL.
    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = url.into();
        self
    }

    /// Sets the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the room.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Sets the ledger capacity.
    pub fn with_max_blocks(mut self, max: usize) -> Self {
        self.max_blocks = max;
        self
    }

    /// Sets the event log capacity.
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    /// Sets the offline queue capacity.
    pub fn with_max_queued(mut self, max: usize) -> Self {
        self.max_queued = max;
        self
    }

    /// Sets the ingestion policy.
    pub fn with_ingest_policy(mut self, policy: IngestPolicy) -> Self {
        self.ingest_policy = policy;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the downgrade monitor interval.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Sets the settle delay before the initial request-sync.
    pub fn with_sync_settle_delay(mut self, delay: Duration) -> Self {
        self.sync_settle_delay = delay;
        self
    }

    /// Sets how long one relay connect attempt may take.
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("peer-local")
    }
}

/// Capped exponential reconnect backoff. Retries never stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay for attempt 0.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculates `min(base * 2^attempt, max)` for a 0-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), Duration::from_millis(30_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_config_builder() {
        let config = NodeConfig::new("peer-a")
            .with_relay_url("ws://127.0.0.1:9000")
            .with_room("test")
            .with_max_blocks(50)
            .with_keepalive_interval(Duration::from_secs(5));

        assert_eq!(config.peer_id, "peer-a");
        assert_eq!(config.relay_url, "ws://127.0.0.1:9000");
        assert_eq!(config.room, "test");
        assert_eq!(config.max_blocks, 50);
        assert_eq!(config.max_events, DEFAULT_MAX_EVENTS);
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.ingest_policy, IngestPolicy::VerifyHash);
    }

    #[test]
    fn default_timings() {
        let config = NodeConfig::default();
        assert_eq!(config.keepalive_interval, Duration::from_secs(25));
        assert_eq!(config.monitor_interval, Duration::from_secs(10));
        assert_eq!(config.sync_settle_delay, Duration::from_secs(1));
        assert_eq!(config.max_queued, 1_000);
    }

    #[test]
    fn backoff_sequence() {
        let retry = RetryConfig::default();
        let delays: Vec<u128> = (0..6)
            .map(|attempt| retry.delay_for_attempt(attempt).as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000]);
    }

    #[test]
    fn backoff_saturates() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(31), Duration::from_secs(30));
        assert_eq!(retry.delay_for_attempt(32), Duration::from_secs(30));
        assert_eq!(retry.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn ingest_policy_checks_hash() {
        let mut block = Block::genesis(1, "vote", "sig");
        assert!(IngestPolicy::VerifyHash.admit(&block).is_ok());

        block.vote_hash = "tampered".into();
        assert!(IngestPolicy::VerifyHash.admit(&block).is_err());
        assert!(IngestPolicy::AcceptAll.admit(&block).is_ok());
    }
}
