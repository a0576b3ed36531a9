//! Periodic sweep over the replicated content store.
//!
//! The peer's store is a process-local [`MemoryStore`]. Only `polls` is
//! fed, by the node mirroring `new-poll` payloads, so the other collections
//! count zero unless a [`ReplicatedStore`] that shares them is attached.
//!
//! [`MemoryStore`]: ledgerlink_sync_engine::MemoryStore

use ledgerlink_sync_engine::store::collect_within;
use ledgerlink_sync_engine::{NodeHandle, ReplicatedStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Collections swept on every pass.
pub const SWEEP_PATHS: [&str; 4] = ["polls", "communities", "images", "posts"];

/// How long each collection is listened to.
pub const SWEEP_DEADLINE: Duration = Duration::from_secs(5);

/// Counts the entries visible under every swept collection.
///
/// Keys starting with `_` are store metadata and are skipped.
pub async fn sweep<S>(store: &S, deadline: Duration) -> u64
where
    S: ReplicatedStore + ?Sized,
{
    let mut total = 0u64;
    for path in SWEEP_PATHS {
        let entries = collect_within(store, path, deadline).await;
        let seen = entries.iter().filter(|(key, _)| !key.starts_with('_')).count() as u64;
        debug!(path, seen, "swept");
        total += seen;
    }
    total
}

/// One sweep pass, reported to the node.
pub async fn run<S>(store: Arc<S>, handle: NodeHandle)
where
    S: ReplicatedStore,
{
    let seen = sweep(store.as_ref(), SWEEP_DEADLINE).await;
    if let Err(e) = handle.record_store_updates(seen).await {
        warn!(error = %e, "could not record sweep");
    }
}
