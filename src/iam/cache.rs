//! Per-run cache of managed policy documents
//!
//! Managed policies are shared by many principals, so every evaluator in a
//! run resolves them through one [`PolicyCache`]. Each identifier gets its own
//! once-cell: the first caller performs the fetch while concurrent callers
//! for the same identifier wait on it, so a document is fetched at most once
//! per run. A failed fetch leaves the cell empty and the next caller retries.

use super::policy::PolicyDocument;
use crate::error::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<PolicyDocument>>>;

/// Cache counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls to [`PolicyCache::get_or_fetch`]
    pub lookups: u64,
    /// Fetches actually started (including failed ones)
    pub fetches: u64,
    /// Identifiers with a resolved document
    pub entries: usize,
}

impl CacheStats {
    /// Lookups served without starting a fetch
    pub fn hits(&self) -> u64 {
        self.lookups.saturating_sub(self.fetches)
    }
}

/// Single-flight cache mapping a managed policy identifier to its document
#[derive(Default)]
pub struct PolicyCache {
    slots: Mutex<HashMap<String, Slot>>,
    lookups: AtomicU64,
    fetches: AtomicU64,
}

impl PolicyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached document for `identifier`, running `fetch` if no
    /// caller has resolved it yet
    pub async fn get_or_fetch<F, Fut>(&self, identifier: &str, fetch: F) -> Result<Arc<PolicyDocument>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PolicyDocument>>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        // The map lock is never held across the fetch
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(identifier.to_string()).or_default().clone()
        };

        let document = slot
            .get_or_try_init(|| async move {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Fetching managed policy {}", identifier);
                fetch().await.map(Arc::new)
            })
            .await?;

        Ok(document.clone())
    }

    /// Cached document for `identifier`, if resolved
    pub fn get(&self, identifier: &str) -> Option<Arc<PolicyDocument>> {
        let slots = self.slots.lock();
        slots.get(identifier).and_then(|slot| slot.get().cloned())
    }

    /// Number of identifiers with a resolved document
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Check if no document has been resolved
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
