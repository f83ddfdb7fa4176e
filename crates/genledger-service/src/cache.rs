//! Short-lived job status cache.
//!
//! The cache is a fast path in front of the job registry, never a source of
//! truth. Producers write the durable row first and the cache second, and
//! [`StatusCache::put`] refuses to move an entry backwards in the lifecycle,
//! so a stale write that loses a race cannot regress what callers see.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use genledger_core::{RequestId, StatusSnapshot};

struct CachedStatus {
    snapshot: StatusSnapshot,
    stored_at: Instant,
}

/// In-process cache of [`StatusSnapshot`]s keyed by request ID.
pub struct StatusCache {
    ttl: Duration,
    entries: RwLock<HashMap<RequestId, CachedStatus>>,
}

impl StatusCache {
    /// Create an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a live entry. Expired entries read as misses.
    pub async fn get(&self, request_id: &RequestId) -> Option<StatusSnapshot> {
        let entries = self.entries.read().await;
        entries
            .get(request_id)
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .map(|cached| cached.snapshot.clone())
    }

    /// Store a snapshot unless a live entry with a later status is present.
    ///
    /// Returns whether the snapshot was stored.
    pub async fn put(&self, snapshot: StatusSnapshot) -> bool {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&snapshot.request_id) {
            let live = existing.stored_at.elapsed() < self.ttl;
            if live && existing.snapshot.status.rank() > snapshot.status.rank() {
                tracing::debug!(
                    request_id = %snapshot.request_id,
                    cached = existing.snapshot.status.as_str(),
                    stale = snapshot.status.as_str(),
                    "Ignoring stale status cache write"
                );
                return false;
            }
        }

        entries.insert(
            snapshot.request_id,
            CachedStatus {
                snapshot,
                stored_at: Instant::now(),
            },
        );
        true
    }

    /// Drop expired entries and return how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| cached.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Number of entries, live or expired.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
