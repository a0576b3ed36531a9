//! Fuzz testing harnesses for LedgerLink.
//!
//! This module provides fuzz targets that can be used with cargo-fuzz
//! or other fuzzing frameworks. Every target must return without
//! panicking for any input.

use crate::fixtures::memory_node;
use ledgerlink_ledger::{validate_structure, Block};
use ledgerlink_sync_protocol::decode_frame;

/// Fuzz target for frame decoding.
pub fn fuzz_decode_frame(data: &[u8]) {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = decode_frame(text);
    }
}

/// Fuzz target for untrusted block decoding.
///
/// Anything that decodes must have passed the structural check.
pub fn fuzz_block_from_json(data: &[u8]) {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if Block::from_json(&value).is_ok() {
        assert!(validate_structure(&value), "decoded a structurally invalid block");
    }
}

/// Fuzz target for a node's inbound path.
///
/// Splits the input on newlines and feeds each line to a connected node
/// as a frame. The ledger must stay sorted and within its bound.
pub fn fuzz_node_frames(data: &[u8]) {
    let mut node = memory_node("fuzz");
    node.on_open();
    for line in data.split(|b| *b == b'\n') {
        if let Ok(text) = std::str::from_utf8(line) {
            node.handle_frame(text);
        }
    }
    let blocks = node.ledger().blocks();
    assert!(blocks.windows(2).all(|w| w[0].index <= w[1].index));
    assert!(blocks.len() <= node.ledger().max_blocks());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::valid_chain;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn handcrafted_inputs() {
        fuzz_decode_frame(b"");
        fuzz_decode_frame(b"\xff\xfe");
        fuzz_decode_frame(br#"{"type":"broadcast","data":{"type":"broadcast"}}"#);
        fuzz_block_from_json(br#"{"index":-1,"timestamp":0}"#);
        fuzz_block_from_json(br#"{"index":1.5}"#);
    }

    #[test]
    fn node_frames_with_real_blocks() {
        let mut input = Vec::new();
        for block in valid_chain(4) {
            let frame = json!({"type": "new-block", "data": block, "timestamp": 0});
            input.extend_from_slice(frame.to_string().as_bytes());
            input.push(b'\n');
        }
        input.extend_from_slice(b"{\"type\":\"request-sync\",\"data\":{\"lastIndex\":\"x\"}}\n");
        fuzz_node_frames(&input);
    }

    proptest! {
        #[test]
        fn decode_frame_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            fuzz_decode_frame(&data);
        }

        #[test]
        fn node_never_panics(lines in prop::collection::vec("[ -~]{0,80}", 0..16)) {
            fuzz_node_frames(lines.join("\n").as_bytes());
        }
    }
}
