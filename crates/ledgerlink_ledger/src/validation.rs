//! Structural and linkage validation.
//!
//! None of these functions attempt fork resolution. They only detect
//! breakage inside whatever sequence they are given.

use crate::block::Block;
use serde_json::Value;

const STRING_FIELDS: [&str; 4] = ["previousHash", "voteHash", "signature", "currentHash"];

/// Checks that every block field is present with the right primitive type.
///
/// `index` must be a non-negative integer, `timestamp` an integer, and the
/// hash and signature fields strings. Values are not inspected otherwise.
pub fn validate_structure(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };

    let index_ok = obj.get("index").is_some_and(Value::is_u64);
    let timestamp_ok = obj.get("timestamp").is_some_and(Value::is_i64);
    let strings_ok = STRING_FIELDS
        .iter()
        .all(|field| obj.get(*field).is_some_and(Value::is_string));

    index_ok && timestamp_ok && strings_ok
}

/// Checks that a block's stored hash matches a fresh recomputation.
pub fn validate_hash(block: &Block) -> bool {
    block.compute_hash() == block.current_hash
}

/// Checks `block` against its immediate predecessor.
///
/// Valid iff the index continues by one, the previous hash matches the
/// predecessor's hash, and the block's own hash recomputes.
pub fn validate_linkage(block: &Block, predecessor: &Block) -> bool {
    predecessor.index.checked_add(1) == Some(block.index)
        && block.previous_hash == predecessor.current_hash
        && validate_hash(block)
}

/// Returns the position of the first block that is not linkage-valid
/// against the block before it, or `None` if the sequence is consistent.
///
/// Position 0 is never checked against anything; a single pass starts at 1.
pub fn scan_for_first_invalid(blocks: &[Block]) -> Option<usize> {
    blocks
        .windows(2)
        .position(|pair| !validate_linkage(&pair[1], &pair[0]))
        .map(|i| i + 1)
}
