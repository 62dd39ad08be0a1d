//! Resource Cache
//!
//! Memoizes secondary lookups (plan to offering, for example) by key. The
//! first caller for a key starts the computation; everyone else asking for the
//! same key before the next [`ResourceCache::clear`] awaits that same
//! computation and sees the same outcome, failures included.

use crate::error::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type SharedLookup<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Cache of in-flight or finished lookups
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct ResourceCache<V: Clone> {
    entries: Arc<Mutex<HashMap<String, SharedLookup<V>>>>,
}

impl<V> ResourceCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedLookup<V>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached lookup for `key`, starting `compute` if there is none
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let lookup = {
            let mut entries = self.lock();
            entries
                .entry(key.to_string())
                .or_insert_with(|| {
                    tracing::debug!("Cache miss: {}", key);
                    compute().boxed().shared()
                })
                .clone()
        };

        lookup.await
    }

    /// Drop every entry; lookups already handed out still complete
    pub fn clear(&self) {
        let mut entries = self.lock();
        tracing::debug!("Clearing {} cached lookups", entries.len());
        entries.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<V> Default for ResourceCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
