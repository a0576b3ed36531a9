//! Capacity-bounded, index-ordered block set.

use crate::block::Block;
use crate::validation::scan_for_first_invalid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default maximum number of retained blocks.
pub const DEFAULT_MAX_BLOCKS: usize = 10_000;

/// The head of a chain: its highest index and that block's hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Index of the head block.
    pub index: u64,
    /// `current_hash` of the head block.
    pub hash: String,
}

impl From<&Block> for ChainHead {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            hash: block.current_hash.clone(),
        }
    }
}

/// The locally held ledger.
///
/// # Invariants
///
/// - No two held blocks share `(index, current_hash)`
/// - Blocks are sorted ascending by `index`; ties keep arrival order
/// - At most `max_blocks` are held; the lowest indices go first
///
/// Dropping old blocks keeps the relative ordering of the retained suffix
/// verifiable, only full-history audit is lost.
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
    keys: HashSet<(u64, String)>,
    max_blocks: usize,
}

impl Ledger {
    /// Creates an empty ledger with the default bound.
    pub fn new() -> Self {
        Self::with_max_blocks(DEFAULT_MAX_BLOCKS)
    }

    /// Creates an empty ledger with a specific bound.
    pub fn with_max_blocks(max_blocks: usize) -> Self {
        Self {
            blocks: Vec::new(),
            keys: HashSet::new(),
            max_blocks: max_blocks.max(1),
        }
    }

    /// Rebuilds a ledger from persisted blocks.
    ///
    /// Duplicates are dropped and the bound is applied, so a hand-edited or
    /// oversized file still loads into a consistent ledger.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>, max_blocks: usize) -> Self {
        let mut ledger = Self::with_max_blocks(max_blocks);
        ledger.extend_new(blocks);
        ledger
    }

    /// Inserts `block` unless its `(index, current_hash)` is already held.
    ///
    /// Returns whether the held set changed. A block that would be evicted
    /// immediately (the ledger is full and it is the lowest index) leaves
    /// the set unchanged.
    pub fn append_if_new(&mut self, block: Block) -> bool {
        let key = (block.index, block.current_hash.clone());
        if self.keys.contains(&key) {
            return false;
        }

        let position = self.blocks.partition_point(|b| b.index <= block.index);
        self.blocks.insert(position, block);
        self.keys.insert(key.clone());
        self.evict();

        self.keys.contains(&key)
    }

    /// Inserts every new block, returning how many changed the held set.
    pub fn extend_new(&mut self, blocks: impl IntoIterator<Item = Block>) -> usize {
        let mut added = 0;
        for block in blocks {
            if self.append_if_new(block) {
                added += 1;
            }
        }
        added
    }

    fn evict(&mut self) {
        if self.blocks.len() <= self.max_blocks {
            return;
        }
        let excess = self.blocks.len() - self.max_blocks;
        for block in self.blocks.drain(..excess) {
            self.keys.remove(&(block.index, block.current_hash));
        }
    }

    /// Returns true if a block with this key is held.
    pub fn contains(&self, index: u64, current_hash: &str) -> bool {
        self.keys.contains(&(index, current_hash.to_string()))
    }

    /// Returns all held blocks with `index > last_index`, ascending.
    ///
    /// A negative `last_index` means "nothing yet" and returns everything.
    pub fn missing_since(&self, last_index: i64) -> Vec<Block> {
        let Ok(last) = u64::try_from(last_index) else {
            return self.blocks.clone();
        };
        let start = self.blocks.partition_point(|b| b.index <= last);
        self.blocks[start..].to_vec()
    }

    /// Returns the highest-index block's head, if any.
    pub fn head(&self) -> Option<ChainHead> {
        self.blocks.last().map(ChainHead::from)
    }

    /// Returns the highest held index, or `-1` if empty.
    pub fn last_index(&self) -> i64 {
        self.blocks
            .last()
            .map(|b| i64::try_from(b.index).unwrap_or(i64::MAX))
            .unwrap_or(-1)
    }

    /// Runs a linkage scan over the held sequence.
    ///
    /// Returns the position (not the index) of the first broken block.
    pub fn audit(&self) -> Option<usize> {
        scan_for_first_invalid(&self.blocks)
    }

    /// Held blocks, ascending by index.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of held blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no blocks are held.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Maximum number of retained blocks.
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: u64) -> Vec<Block> {
        let mut blocks = vec![Block::genesis(0, "v0", "s0")];
        for i in 1..n {
            let next = blocks.last().unwrap().next(i as i64, format!("v{i}"), format!("s{i}"));
            blocks.push(next);
        }
        blocks
    }

    #[test]
    fn append_dedups_by_index_and_hash() {
        let mut ledger = Ledger::new();
        let block = Block::genesis(1, "v", "s");

        assert!(ledger.append_if_new(block.clone()));
        assert!(!ledger.append_if_new(block));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn same_index_different_hash_is_kept() {
        let mut ledger = Ledger::new();
        assert!(ledger.append_if_new(Block::new(1, 1, "p", "a", "s")));
        assert!(ledger.append_if_new(Block::new(1, 1, "p", "b", "s")));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn out_of_order_arrivals_are_sorted() {
        let mut ledger = Ledger::new();
        let blocks = chain(6);
        for i in [4, 1, 5, 0, 3, 2] {
            ledger.append_if_new(blocks[i].clone());
        }
        let indices: Vec<u64> = ledger.blocks().iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ledger.audit(), None);
    }

    #[test]
    fn eviction_drops_lowest_index_first() {
        const MAX: usize = 8;
        let mut ledger = Ledger::with_max_blocks(MAX);
        for block in chain(MAX as u64 + 1) {
            ledger.append_if_new(block);
        }
        assert_eq!(ledger.len(), MAX);
        assert_eq!(ledger.blocks()[0].index, 1);
        assert_eq!(ledger.head().unwrap().index, MAX as u64);
    }

    #[test]
    fn block_evicted_on_arrival_reports_no_change() {
        let blocks = chain(4);
        let mut ledger = Ledger::with_max_blocks(3);
        for b in &blocks[1..] {
            ledger.append_if_new(b.clone());
        }
        assert!(!ledger.append_if_new(blocks[0].clone()));
        assert_eq!(ledger.blocks()[0].index, 1);
        assert!(!ledger.contains(0, &blocks[0].current_hash));
    }

    #[test]
    fn missing_since_bounds() {
        let mut ledger = Ledger::new();
        ledger.extend_new(chain(5));

        assert_eq!(ledger.missing_since(-1).len(), 5);
        assert_eq!(ledger.missing_since(-42).len(), 5);

        let tail: Vec<u64> = ledger.missing_since(2).iter().map(|b| b.index).collect();
        assert_eq!(tail, vec![3, 4]);

        assert!(ledger.missing_since(4).is_empty());
        assert!(ledger.missing_since(100).is_empty());
    }

    #[test]
    fn head_and_last_index() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.head(), None);
        assert_eq!(ledger.last_index(), -1);

        let blocks = chain(3);
        ledger.extend_new(blocks.clone());
        assert_eq!(ledger.last_index(), 2);
        assert_eq!(ledger.head(), Some(ChainHead::from(&blocks[2])));
    }

    #[test]
    fn extend_counts_only_new() {
        let mut ledger = Ledger::new();
        let blocks = chain(5);
        assert_eq!(ledger.extend_new(blocks.clone()), 5);
        assert_eq!(ledger.extend_new(blocks), 0);
    }

    #[test]
    fn from_blocks_dedups_and_bounds() {
        let mut blocks = chain(5);
        blocks.extend(chain(5));
        let ledger = Ledger::from_blocks(blocks, 3);
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.blocks()[0].index, 2);
    }

    #[test]
    fn audit_reports_position() {
        let mut blocks = chain(6);
        blocks[4].vote_hash = "tampered".into();
        let ledger = Ledger::from_blocks(blocks, 100);
        assert_eq!(ledger.audit(), Some(4));
    }
}
