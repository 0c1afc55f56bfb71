//! [`WorkingMemory`]: a process-local scratchpad scoped to a single agent
//! run. Backed directly by a [`MemoryStore`] scalar namespace so it shares
//! storage wiring with the other layers, but callers should treat it as
//! ephemeral — nothing here survives a [`clear`](WorkingMemory::clear).

use std::sync::Arc;

use crate::error::StoreError;
use crate::memory::store::MemoryStore;

/// Scratchpad keyed by `(namespace, key)`. Values are opaque strings; callers
/// that need structure serialize their own JSON.
pub struct WorkingMemory {
    store: Arc<dyn MemoryStore>,
    namespace: String,
}

impl WorkingMemory {
    pub fn new(store: Arc<dyn MemoryStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.store.get(&self.namespace, key).await?;
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.set(&self.namespace, key, value).await
    }

    /// Parses the current value as an integer (defaulting to 0 if absent or
    /// unparseable), adds `delta`, and persists the result.
    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let current: i64 = self.get(key).await?.and_then(|v| v.parse().ok()).unwrap_or(0);
        let next = current + delta;
        self.set(key, &next.to_string()).await?;
        Ok(next)
    }

    pub async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.namespace, key).await
    }
}
