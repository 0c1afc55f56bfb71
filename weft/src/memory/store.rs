//! [`MemoryStore`] (C1): the namespaced KV + appendable-list capability set
//! every memory layer is built over (spec §6). An empty-string result
//! denotes absence for scalar reads, matching the source contract exactly
//! rather than using `Option<String>` — callers that want `Option`
//! semantics treat `""` as "missing" themselves (see [`short_term`](crate::memory::short_term)
//! and [`long_term`](crate::memory::long_term), which do exactly that).

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;

/// Namespaced KV + appendable list primitives. Implementations must be safe
/// for concurrent use; no locks are layered on top by memory-layer callers.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(&self, ns: &str, key: &str) -> Result<String, StoreError>;
    async fn set(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, ns: &str, key: &str) -> Result<(), StoreError>;
    async fn list_keys(&self, ns: &str) -> Result<Vec<String>, StoreError>;

    async fn append(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError>;
    async fn get_list(
        &self,
        ns: &str,
        key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, StoreError>;
    async fn trim_list(&self, ns: &str, key: &str, max_size: usize) -> Result<(), StoreError>;
    async fn clear_list(&self, ns: &str, key: &str) -> Result<(), StoreError>;
    async fn list_length(&self, ns: &str, key: &str) -> Result<usize, StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn scoped(ns: &str, key: &str) -> String {
    format!("{ns}\u{0}{key}")
}

/// Process-local [`MemoryStore`] backed by `dashmap`. The default backend
/// for tests and for [`crate::memory::working::WorkingMemory`]-only
/// deployments; data does not survive process exit.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    scalars: DashMap<String, String>,
    lists: DashMap<String, Vec<String>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(&self, ns: &str, key: &str) -> Result<String, StoreError> {
        Ok(self.scalars.get(&scoped(ns, key)).map(|v| v.clone()).unwrap_or_default())
    }

    async fn set(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.scalars.insert(scoped(ns, key), value.to_string());
        Ok(())
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        self.scalars.remove(&scoped(ns, key));
        Ok(())
    }

    async fn list_keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{ns}\u{0}");
        Ok(self
            .scalars
            .iter()
            .filter_map(|entry| entry.key().strip_prefix(&prefix).map(|k| k.to_string()))
            .collect())
    }

    async fn append(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.lists.entry(scoped(ns, key)).or_default().push(value.to_string());
        Ok(())
    }

    async fn get_list(
        &self,
        ns: &str,
        key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, StoreError> {
        let list = self.lists.get(&scoped(ns, key));
        let Some(list) = list else { return Ok(Vec::new()) };
        Ok(list
            .iter()
            .skip(offset)
            .take(if limit == 0 { usize::MAX } else { limit })
            .cloned()
            .collect())
    }

    async fn trim_list(&self, ns: &str, key: &str, max_size: usize) -> Result<(), StoreError> {
        if let Some(mut list) = self.lists.get_mut(&scoped(ns, key)) {
            if list.len() > max_size {
                let excess = list.len() - max_size;
                list.drain(0..excess);
            }
        }
        Ok(())
    }

    async fn clear_list(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        self.lists.remove(&scoped(ns, key));
        Ok(())
    }

    async fn list_length(&self, ns: &str, key: &str) -> Result<usize, StoreError> {
        Ok(self.lists.get(&scoped(ns, key)).map(|l| l.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scalar_get_set_delete_round_trip() {
        let store = InMemoryMemoryStore::new();
        assert_eq!(store.get("ns", "k").await.unwrap(), "");
        store.set("ns", "k", "v").await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), "v");
        store.delete("ns", "k").await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), "");
    }

    #[tokio::test]
    async fn namespaces_do_not_leak_into_each_other() {
        let store = InMemoryMemoryStore::new();
        store.set("a", "k", "1").await.unwrap();
        store.set("b", "k", "2").await.unwrap();
        assert_eq!(store.get("a", "k").await.unwrap(), "1");
        assert_eq!(store.get("b", "k").await.unwrap(), "2");
        assert_eq!(store.list_keys("a").await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn list_primitives_append_trim_clear_length() {
        let store = InMemoryMemoryStore::new();
        for i in 0..5 {
            store.append("ns", "hist", &i.to_string()).await.unwrap();
        }
        assert_eq!(store.list_length("ns", "hist").await.unwrap(), 5);
        store.trim_list("ns", "hist", 3).await.unwrap();
        assert_eq!(store.get_list("ns", "hist", 0, 0).await.unwrap(), vec!["2", "3", "4"]);
        store.clear_list("ns", "hist").await.unwrap();
        assert_eq!(store.list_length("ns", "hist").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_list_respects_limit_and_offset() {
        let store = InMemoryMemoryStore::new();
        for i in 0..10 {
            store.append("ns", "l", &i.to_string()).await.unwrap();
        }
        let page = store.get_list("ns", "l", 3, 2).await.unwrap();
        assert_eq!(page, vec!["2", "3", "4"]);
    }
}
