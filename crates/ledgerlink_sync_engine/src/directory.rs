//! Server Directory: every relay/store endpoint this node has heard of.

use ledgerlink_sync_protocol::ServerRecord;
use std::collections::HashSet;

/// Deduplicated registry of [`ServerRecord`]s keyed by websocket URL.
///
/// Insertion order is kept. The first record seen for a key wins; later
/// merges never touch its attribution or `first_seen`.
#[derive(Debug, Clone, Default)]
pub struct ServerDirectory {
    records: Vec<ServerRecord>,
    keys: HashSet<String>,
}

impl ServerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from persisted records, keeping the first of any
    /// duplicates.
    pub fn from_records(records: impl IntoIterator<Item = ServerRecord>) -> Self {
        let mut directory = Self::new();
        for record in records {
            directory.insert(record);
        }
        directory
    }

    /// Merges incoming records and returns how many were new.
    ///
    /// New records get `added_by = attributed_to` and `first_seen = now_ms`
    /// when they arrive without them. Records with an empty websocket URL
    /// are skipped.
    pub fn merge(
        &mut self,
        records: impl IntoIterator<Item = ServerRecord>,
        attributed_to: &str,
        now_ms: i64,
    ) -> usize {
        let mut added = 0;
        for mut record in records {
            if record.added_by.is_empty() {
                record.added_by = attributed_to.to_string();
            }
            if record.first_seen == 0 {
                record.first_seen = now_ms;
            }
            if self.insert(record) {
                added += 1;
            }
        }
        added
    }

    fn insert(&mut self, record: ServerRecord) -> bool {
        if record.websocket.is_empty() || self.keys.contains(&record.websocket) {
            return false;
        }
        self.keys.insert(record.websocket.clone());
        self.records.push(record);
        true
    }

    /// Returns true if the websocket URL is known.
    pub fn contains(&self, websocket: &str) -> bool {
        self.keys.contains(websocket)
    }

    /// Looks up a record.
    pub fn get(&self, websocket: &str) -> Option<&ServerRecord> {
        self.records.iter().find(|r| r.websocket == websocket)
    }

    /// Removes a record. Returns whether it was present.
    pub fn remove(&mut self, websocket: &str) -> bool {
        if !self.keys.remove(websocket) {
            return false;
        }
        self.records.retain(|r| r.websocket != websocket);
        true
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[ServerRecord] {
        &self.records
    }

    /// Number of known servers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no servers are known.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_idempotent() {
        let mut directory = ServerDirectory::new();
        let record = ServerRecord::new("wss://a", "https://a/gun", "https://a");

        assert_eq!(directory.merge(vec![record.clone()], "peer-1", 100), 1);
        assert_eq!(directory.merge(vec![record], "peer-2", 200), 0);

        assert_eq!(directory.len(), 1);
        let stored = directory.get("wss://a").unwrap();
        assert_eq!(stored.added_by, "peer-1");
        assert_eq!(stored.first_seen, 100);
    }

    #[test]
    fn merge_keeps_existing_attribution() {
        let mut directory = ServerDirectory::new();
        let mut record = ServerRecord::new("wss://a", "", "");
        record.added_by = "origin".into();
        record.first_seen = 42;

        directory.merge(vec![record], "relayer", 100);
        let stored = directory.get("wss://a").unwrap();
        assert_eq!(stored.added_by, "origin");
        assert_eq!(stored.first_seen, 42);
    }

    #[test]
    fn merge_skips_empty_keys_and_duplicates_in_batch() {
        let mut directory = ServerDirectory::new();
        let added = directory.merge(
            vec![
                ServerRecord::new("", "s", "a"),
                ServerRecord::new("wss://b", "s1", "a1"),
                ServerRecord::new("wss://b", "s2", "a2"),
            ],
            "peer",
            1,
        );
        assert_eq!(added, 1);
        assert_eq!(directory.get("wss://b").unwrap().store, "s1");
    }

    #[test]
    fn insertion_order_and_remove() {
        let mut directory = ServerDirectory::from_records(vec![
            ServerRecord::new("wss://c", "", ""),
            ServerRecord::new("wss://a", "", ""),
            ServerRecord::new("wss://c", "dup", ""),
        ]);
        let keys: Vec<&str> = directory.records().iter().map(|r| r.websocket.as_str()).collect();
        assert_eq!(keys, vec!["wss://c", "wss://a"]);

        assert!(directory.remove("wss://c"));
        assert!(!directory.remove("wss://c"));
        assert!(!directory.contains("wss://c"));
        assert_eq!(directory.len(), 1);

        // A removed key can be learned again.
        assert_eq!(directory.merge(vec![ServerRecord::new("wss://c", "", "")], "p", 5), 1);
    }
}
