//! Optimistic cache writes with a single-level compensating undo.
//!
//! The transformed value is visible to readers immediately; the network
//! write decides whether it stays. Undo restores the snapshot taken at apply
//! time, so undoing an older update after a newer one has landed also
//! discards the newer one (last writer wins, one level only).

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStore};

#[must_use = "call undo() if the write fails, or commit() once it succeeds"]
pub struct OptimisticUndo {
    cache: Arc<CacheStore>,
    snapshots: Vec<CacheEntry>,
}

impl OptimisticUndo {
    /// Put every touched entry back exactly as it was before the transform.
    pub fn undo(self) {
        debug!(entries = self.snapshots.len(), "Rolling back optimistic update");
        for snapshot in self.snapshots.into_iter().rev() {
            self.cache.restore(snapshot);
        }
    }

    /// Keep the optimistic values.
    pub fn commit(self) {}

    /// Keys that actually held a value and were transformed.
    pub fn keys(&self) -> Vec<&str> {
        self.snapshots.iter().map(|s| s.key.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Apply `transform` to each cached key. Keys with nothing cached are left
/// alone; duplicate keys are transformed once.
pub fn apply<K, F>(cache: &Arc<CacheStore>, keys: &[K], transform: F) -> OptimisticUndo
where
    K: AsRef<str>,
    F: Fn(&Value) -> Value,
{
    let mut seen = HashSet::new();
    let snapshots = keys
        .iter()
        .map(|key| key.as_ref())
        .filter(|key| seen.insert(*key))
        .filter_map(|key| cache.update(key, &transform))
        .collect();
    OptimisticUndo {
        cache: Arc::clone(cache),
        snapshots,
    }
}
