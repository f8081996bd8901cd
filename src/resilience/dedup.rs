//! In-flight request deduplication.
//!
//! Concurrent callers issuing the same logical request share one underlying
//! call and observe the same outcome. Registration happens synchronously in
//! [`Deduplicator::deduplicate`], so two calls made back to back before either
//! future is polled still invoke the operation exactly once.
//!
//! The underlying call runs on its own task: it completes and clears its
//! registration even if every caller stops waiting.

use crate::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Shareable handle to an in-flight call.
pub type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Entry<T: Clone> {
    id: u64,
    future: SharedCall<T>,
}

type Registry<T> = Arc<Mutex<HashMap<String, Entry<T>>>>;

/// Coalesces identical in-flight calls keyed by [`dedup_key`].
pub struct Deduplicator<T: Clone> {
    inflight: Registry<T>,
    next_id: AtomicU64,
}

/// `METHOD:url:serialized-body`, with an empty body segment when absent.
pub fn dedup_key(method: &str, url: &str, body: Option<&serde_json::Value>) -> String {
    let body = body
        .and_then(|b| serde_json::to_string(b).ok())
        .unwrap_or_default();
    format!("{}:{}:{}", method.to_uppercase(), url, body)
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Return the pending call registered under `key`, or start `op` and register it.
    ///
    /// The entry is removed as soon as the call settles, on success and on failure.
    pub fn deduplicate<F, Fut>(&self, key: &str, op: F) -> SharedCall<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = inflight.get(key) {
            debug!(key, "joining in-flight request");
            return existing.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inflight);
        let owned_key = key.to_string();
        let call = op();
        let task = tokio::spawn(async move {
            let result = call.await;
            if let Some(registry) = registry.upgrade() {
                let mut map = registry
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if map.get(&owned_key).map(|e| e.id) == Some(id) {
                    map.remove(&owned_key);
                }
            }
            result
        });
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::network(format!("request task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        inflight.insert(
            key.to_string(),
            Entry {
                id,
                future: future.clone(),
            },
        );
        future
    }

    /// Number of keys with a call currently in flight.
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_inflight(&self, key: &str) -> bool {
        self.inflight
            .lock()
            .map(|m| m.contains_key(key))
            .unwrap_or(false)
    }

    /// Drop every registration; already-running calls still complete for their holders.
    pub fn clear(&self) {
        if let Ok(mut m) = self.inflight.lock() {
            m.clear();
        }
    }
}

impl<T> Default for Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
