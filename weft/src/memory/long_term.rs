//! [`LongTermMemory`]: one deep-merged JSON document per namespace, the
//! closest analogue to a user profile. Reads are cached for a short TTL so a
//! hot conversation loop doesn't round-trip storage on every turn; writes
//! invalidate the cache immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::memory::store::MemoryStore;

const DOC_KEY: &str = "long_term:profile";
const DEFAULT_TTL: Duration = Duration::from_secs(5);

struct Cached {
    value: Value,
    at: Instant,
}

/// Deep-merged per-namespace document, with a short read-through cache.
pub struct LongTermMemory {
    store: Arc<dyn MemoryStore>,
    namespace: String,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
}

impl LongTermMemory {
    pub fn new(store: Arc<dyn MemoryStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl: DEFAULT_TTL,
            cache: RwLock::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the whole document, `{}` if nothing has been stored yet.
    pub async fn get(&self) -> Result<Value, StoreError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.at.elapsed() < self.ttl {
                return Ok(cached.value.clone());
            }
        }
        let raw = self.store.get(&self.namespace, DOC_KEY).await?;
        let value: Value = if raw.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(&raw)?
        };
        *self.cache.write().await = Some(Cached {
            value: value.clone(),
            at: Instant::now(),
        });
        Ok(value)
    }

    /// Deep-merges `patch` into the stored document and bumps
    /// `meta.conversation_count`, then persists and invalidates the cache.
    pub async fn update(&self, patch: &Value) -> Result<Value, StoreError> {
        let mut current = self.get().await?;
        deep_merge(&mut current, patch);
        bump_conversation_count(&mut current);
        let encoded = serde_json::to_string(&current)?;
        self.store.set(&self.namespace, DOC_KEY, &encoded).await?;
        *self.cache.write().await = Some(Cached {
            value: current.clone(),
            at: Instant::now(),
        });
        Ok(current)
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(&self.namespace, DOC_KEY).await?;
        *self.cache.write().await = None;
        Ok(())
    }
}

fn bump_conversation_count(doc: &mut Value) {
    let obj = doc.as_object_mut().expect("long-term document is always an object");
    let meta = obj.entry("meta").or_insert_with(|| Value::Object(Map::new()));
    let meta_obj = meta.as_object_mut().expect("meta is always an object");
    let count = meta_obj.get("conversation_count").and_then(Value::as_i64).unwrap_or(0);
    meta_obj.insert("conversation_count".into(), Value::from(count + 1));
}

/// Recursive deep-merge: dict+dict merges key-wise, list+list concatenates
/// with value-equality dedup, `null` in `patch` never overwrites an existing
/// value, and any other combination (including type mismatch) lets `patch`
/// overwrite `base`.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                match base_map.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        if !v.is_null() {
                            base_map.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
        }
        (Value::Array(base_list), Value::Array(patch_list)) => {
            for item in patch_list {
                if !base_list.contains(item) {
                    base_list.push(item.clone());
                }
            }
        }
        (base_slot, patch_value) => {
            if !patch_value.is_null() {
                *base_slot = patch_value.clone();
            }
        }
    }
}
