//! Chain builders and property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use ledgerlink_ledger::{Block, SignedEvent};
use ledgerlink_sync_protocol::ServerRecord;
use proptest::prelude::*;
use serde_json::{json, Map};

/// Builds a correctly linked chain of `n` blocks with indices `0..n`.
pub fn valid_chain(n: usize) -> Vec<Block> {
    extend_chain(Vec::new(), n)
}

/// Appends `more` correctly linked blocks to `blocks`.
pub fn extend_chain(mut blocks: Vec<Block>, more: usize) -> Vec<Block> {
    for _ in 0..more {
        let next = match blocks.last() {
            Some(last) => {
                let i = last.index + 1;
                last.next(1_700_000_000_000 + i as i64, format!("vote-{i}"), format!("sig-{i}"))
            }
            None => Block::genesis(1_700_000_000_000, "vote-0", "sig-0"),
        };
        blocks.push(next);
    }
    blocks
}

/// Builds a signed event with the given id.
pub fn signed_event(id: &str, kind: i64) -> SignedEvent {
    SignedEvent {
        id: id.to_string(),
        kind: Some(json!(kind)),
        payload: Map::from_iter([("content".to_string(), json!(format!("event {id}")))]),
    }
}

/// Strategy for generating blocks with valid hashes but arbitrary linkage.
pub fn block_strategy() -> impl Strategy<Value = Block> {
    (
        0u64..64,
        any::<i64>(),
        "[0-9a-f]{0,64}",
        "[0-9a-f]{1,64}",
        "[A-Za-z0-9+/]{0,32}",
    )
        .prop_map(|(index, timestamp, previous, vote, signature)| {
            Block::new(index, timestamp, previous, vote, signature)
        })
}

/// Strategy for generating a valid chain of up to `max_len` blocks.
pub fn chain_strategy(max_len: usize) -> impl Strategy<Value = Vec<Block>> {
    (0..=max_len).prop_map(valid_chain)
}

/// Strategy for generating signed events with a small id space, so
/// duplicates are common.
pub fn signed_event_strategy() -> impl Strategy<Value = SignedEvent> {
    ("[a-f]{1,2}", 0i64..4).prop_map(|(id, kind)| signed_event(&id, kind))
}

/// Strategy for generating server records over a small key space.
pub fn server_record_strategy() -> impl Strategy<Value = ServerRecord> {
    (0u8..8, "[a-z]{0,6}", any::<bool>()).prop_map(|(host, added_by, self_hosted)| {
        let mut record = ServerRecord::new(
            format!("wss://relay-{host}.example"),
            format!("https://store-{host}.example/gun"),
            format!("https://relay-{host}.example"),
        );
        record.added_by = added_by;
        record.self_hosted = self_hosted;
        record
    })
}
