//! Replicated graph store collaborator.
//!
//! The ledger core only needs `put`, `get` and `subscribe` by path. Reads
//! that span a collection follow a fixed shape: collect for a bounded time,
//! hand back what arrived, then keep listening. Nothing here ever waits for
//! the store to go quiet, since an empty collection never does.

use crate::error::SyncResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// One `(key, value)` child update under a subscribed path.
pub type StoreUpdate = (String, Value);

/// A put/get/subscribe store addressed by slash-separated paths.
///
/// `put("polls/p1", v)` writes child `p1` of collection `polls`.
/// `subscribe("polls")` replays existing children and then streams every
/// later write under `polls`. The last write observed wins.
pub trait ReplicatedStore: Send + Sync + 'static {
    /// Writes a value.
    fn put(&self, path: &str, value: Value) -> SyncResult<()>;

    /// Reads a single value snapshot.
    fn get(&self, path: &str) -> Option<Value>;

    /// Streams child updates under `path`. Dropping the receiver cancels.
    fn subscribe(&self, path: &str) -> mpsc::UnboundedReceiver<StoreUpdate>;
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    }
}

#[derive(Default)]
struct MemoryInner {
    children: BTreeMap<String, BTreeMap<String, Value>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<StoreUpdate>>>,
}

/// In-process [`ReplicatedStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of children under `path`.
    pub fn child_count(&self, path: &str) -> usize {
        self.inner
            .read()
            .children
            .get(path)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl ReplicatedStore for MemoryStore {
    fn put(&self, path: &str, value: Value) -> SyncResult<()> {
        let (parent, key) = split_path(path);
        let mut inner = self.inner.write();
        inner
            .children
            .entry(parent.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());

        if let Some(senders) = inner.subscribers.get_mut(parent) {
            senders.retain(|tx| tx.send((key.to_string(), value.clone())).is_ok());
        }
        Ok(())
    }

    fn get(&self, path: &str) -> Option<Value> {
        let (parent, key) = split_path(path);
        self.inner
            .read()
            .children
            .get(parent)
            .and_then(|children| children.get(key))
            .cloned()
    }

    fn subscribe(&self, path: &str) -> mpsc::UnboundedReceiver<StoreUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write();
        if let Some(children) = inner.children.get(path) {
            for (key, value) in children {
                let _ = tx.send((key.clone(), value.clone()));
            }
        }
        inner
            .subscribers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

/// Collects child updates under `path` for exactly `deadline`, then stops
/// listening. Later writes to the same key replace earlier ones.
pub async fn collect_within<S>(store: &S, path: &str, deadline: Duration) -> Vec<StoreUpdate>
where
    S: ReplicatedStore + ?Sized,
{
    let mut updates = store.subscribe(path);
    let until = Instant::now() + deadline;
    let mut collected: BTreeMap<String, Value> = BTreeMap::new();

    loop {
        tokio::select! {
            _ = sleep_until(until) => break,
            update = updates.recv() => match update {
                Some((key, value)) => {
                    collected.insert(key, value);
                }
                None => {
                    // Store went away; the deadline still bounds the call.
                    sleep_until(until).await;
                    break;
                }
            },
        }
    }
    collected.into_iter().collect()
}

/// A live delivery that can be stopped.
///
/// `stop` is idempotent and no callback runs after it returns. Dropping a
/// subscription stops it.
#[derive(Debug)]
pub struct Subscription {
    stopped: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stops delivery.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
    }

    /// Returns true once stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Waits for the delivery task to finish.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delivers a deadline-bounded snapshot of `path`, then keeps delivering
/// keys that were not part of it.
///
/// `on_item` receives `(key, value, live)`, where `live` is false for
/// snapshot items. If the subscription is stopped before the deadline the
/// deadline still fires, sees the stop and delivers nothing.
pub fn snapshot_then_follow<S, F>(
    store: Arc<S>,
    path: &str,
    deadline: Duration,
    mut on_item: F,
) -> Subscription
where
    S: ReplicatedStore + ?Sized,
    F: FnMut(String, Value, bool) + Send + 'static,
{
    let stopped = Arc::new(AtomicBool::new(false));
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let path = path.to_string();
    let flag = Arc::clone(&stopped);

    let task = tokio::spawn(async move {
        let mut updates = store.subscribe(&path);
        let until = Instant::now() + deadline;
        let mut snapshot: BTreeMap<String, Value> = BTreeMap::new();
        let mut open = true;

        while open {
            tokio::select! {
                _ = sleep_until(until) => break,
                update = updates.recv() => match update {
                    Some((key, value)) => {
                        snapshot.insert(key, value);
                    }
                    None => open = false,
                },
            }
        }
        if !open {
            sleep_until(until).await;
        }

        if flag.load(Ordering::SeqCst) {
            trace!(path = %path, "subscription stopped before deadline");
            return;
        }

        let seen: HashSet<String> = snapshot.keys().cloned().collect();
        for (key, value) in snapshot {
            if flag.load(Ordering::SeqCst) {
                return;
            }
            on_item(key, value, false);
        }

        loop {
            tokio::select! {
                _ = stop_rx.changed() => return,
                update = updates.recv() => match update {
                    Some((key, value)) => {
                        if flag.load(Ordering::SeqCst) {
                            return;
                        }
                        if !seen.contains(&key) {
                            on_item(key, value, true);
                        }
                    }
                    None => return,
                },
            }
        }
    });

    Subscription {
        stopped,
        stop_tx,
        task: Some(task),
    }
}
