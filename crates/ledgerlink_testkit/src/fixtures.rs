//! Test fixtures and node helpers.
//!
//! Provides convenience functions for setting up test nodes backed by
//! memory or by a temporary data directory.

use ledgerlink_ledger::Block;
use ledgerlink_storage::{DataDir, InMemoryDocument, StorageResult};
use ledgerlink_sync_engine::{Node, NodeConfig, NodeStores};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A configuration with a distinct relay URL per peer, so each node
/// contributes its own directory entry.
pub fn test_config(peer_id: &str) -> NodeConfig {
    NodeConfig::new(peer_id)
        .with_relay_url(format!("ws://{peer_id}.relay.test"))
        .with_store_url(format!("http://{peer_id}.store.test/gun"))
        .with_api_url(format!("http://{peer_id}.api.test"))
}

/// An empty in-memory node.
pub fn memory_node(peer_id: &str) -> Node {
    Node::open(test_config(peer_id), NodeStores::in_memory())
}

/// An in-memory node that starts with `blocks` already persisted.
pub fn seeded_node(config: NodeConfig, blocks: &[Block]) -> Node {
    let data = serde_json::to_vec_pretty(blocks).expect("Failed to encode blocks");
    Node::open(
        config,
        NodeStores::from_documents(
            InMemoryDocument::with_data(data),
            InMemoryDocument::new(),
            InMemoryDocument::new(),
        ),
    )
}

/// A node persisted in a temporary data directory.
pub struct TestPeer {
    /// The node.
    pub node: Node,
    dir: DataDir,
    /// Kept alive to prevent cleanup.
    _temp_dir: Option<TempDir>,
}

impl TestPeer {
    /// Creates a peer in a fresh temporary directory.
    pub fn temp(peer_id: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("peer-data");
        let mut peer = Self::open(peer_id, &path).expect("Failed to open data directory");
        peer._temp_dir = Some(temp_dir);
        peer
    }

    /// Opens a peer on an existing path, creating it if missing.
    pub fn open(peer_id: &str, path: &Path) -> StorageResult<Self> {
        let dir = DataDir::open(path, true)?;
        let node = Node::open(test_config(peer_id), NodeStores::in_dir(&dir));
        Ok(Self {
            node,
            dir,
            _temp_dir: None,
        })
    }

    /// Data directory path.
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Flushes, releases the directory lock and returns the temp dir so
    /// the files outlive the peer.
    pub fn close(mut self) -> Option<TempDir> {
        self.node.flush().expect("Failed to flush node");
        self._temp_dir.take()
    }
}

impl std::ops::Deref for TestPeer {
    type Target = Node;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl std::ops::DerefMut for TestPeer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::valid_chain;
    use ledgerlink_storage::StorageError;

    #[test]
    fn seeded_node_loads_blocks() {
        let node = seeded_node(test_config("a"), &valid_chain(4));
        assert_eq!(node.ledger().last_index(), 3);
    }

    #[test]
    fn temp_peer_persists_across_reopen() {
        let mut peer = TestPeer::temp("a");
        for block in valid_chain(3) {
            peer.publish_block(block).unwrap();
        }
        let path = peer.path();
        let temp = peer.close();

        let reopened = TestPeer::open("a", &path).unwrap();
        assert_eq!(reopened.ledger().len(), 3);
        drop(temp);
    }

    #[test]
    fn second_peer_on_same_dir_is_locked() {
        let peer = TestPeer::temp("a");
        let result = TestPeer::open("b", &peer.path());
        assert!(matches!(result, Err(StorageError::Locked(_))));
    }
}
