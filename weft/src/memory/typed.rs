//! [`TypedMemory`]: classified, scored memory entries (semantic / episodic /
//! procedural), the layer the [`crate::memory::consolidator::Consolidator`]
//! writes extracted facts into and the
//! [`crate::memory::retriever::MemoryRetriever`] ranks above a long-term
//! digest.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::memory::store::MemoryStore;

const LIST_KEY: &str = "typed:entries";

/// The three memory kinds spec'd for classified recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedKind {
    Semantic,
    Episodic,
    Procedural,
}

/// One classified memory entry. `access_count` and `updated_at` are bumped
/// every time the entry is returned by [`TypedMemory::get`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedEntry {
    pub id: String,
    pub kind: TypedKind,
    pub content: String,
    pub score: f64,
    pub metadata: Value,
    pub access_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Scored, classified memory entries stored as a flat JSON list per
/// namespace. Small deployments only; retrieval is a linear scan — an
/// [`crate::memory::embedding::EmbeddingStore`] is the scale-out path.
pub struct TypedMemory {
    store: Arc<dyn MemoryStore>,
    namespace: String,
}

impl TypedMemory {
    pub fn new(store: Arc<dyn MemoryStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    async fn load_all(&self) -> Result<Vec<TypedEntry>, StoreError> {
        let raw = self.store.get_list(&self.namespace, LIST_KEY, 0, 0).await?;
        raw.iter().map(|s| serde_json::from_str(s).map_err(StoreError::from)).collect()
    }

    async fn save_all(&self, entries: &[TypedEntry]) -> Result<(), StoreError> {
        self.store.clear_list(&self.namespace, LIST_KEY).await?;
        for entry in entries {
            self.store.append(&self.namespace, LIST_KEY, &serde_json::to_string(entry)?).await?;
        }
        Ok(())
    }

    /// Adds a new entry and returns its generated id.
    pub async fn add(&self, kind: TypedKind, content: &str, score: f64, metadata: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let entry = TypedEntry {
            id: id.clone(),
            kind,
            content: content.to_string(),
            score,
            metadata,
            access_count: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.append(&self.namespace, LIST_KEY, &serde_json::to_string(&entry)?).await?;
        Ok(id)
    }

    /// Returns the entry by id, bumping `access_count`/`updated_at` as a
    /// side effect of the read.
    pub async fn get(&self, id: &str) -> Result<Option<TypedEntry>, StoreError> {
        let mut entries = self.load_all().await?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        entry.access_count += 1;
        entry.updated_at = Utc::now().to_rfc3339();
        let found = entry.clone();
        self.save_all(&entries).await?;
        Ok(Some(found))
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut entries = self.load_all().await?;
        entries.retain(|e| e.id != id);
        self.save_all(&entries).await
    }

    /// Entries of `kind`, highest score first.
    pub async fn list_by_kind(&self, kind: TypedKind) -> Result<Vec<TypedEntry>, StoreError> {
        let mut entries: Vec<TypedEntry> = self.load_all().await?.into_iter().filter(|e| e.kind == kind).collect();
        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(entries)
    }

    /// Naive substring-match ranked by score, for deployments without an
    /// embedding store.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<TypedEntry>, StoreError> {
        let needle = query.to_lowercase();
        let mut matches: Vec<TypedEntry> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::InMemoryMemoryStore;
    use serde_json::json;

    fn typed() -> TypedMemory {
        TypedMemory::new(Arc::new(InMemoryMemoryStore::new()), "agent:user")
    }

    #[tokio::test]
    async fn add_then_get_bumps_access_count() {
        let mem = typed();
        let id = mem.add(TypedKind::Semantic, "likes tea", 0.9, json!({})).await.unwrap();
        let entry = mem.get(&id).await.unwrap().unwrap();
        assert_eq!(entry.access_count, 1);
        let entry = mem.get(&id).await.unwrap().unwrap();
        assert_eq!(entry.access_count, 2);
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let mem = typed();
        let id = mem.add(TypedKind::Episodic, "visited Tokyo", 0.5, json!({})).await.unwrap();
        mem.delete(&id).await.unwrap();
        assert!(mem.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_kind_filters_and_sorts_by_score_descending() {
        let mem = typed();
        mem.add(TypedKind::Semantic, "a", 0.2, json!({})).await.unwrap();
        mem.add(TypedKind::Semantic, "b", 0.8, json!({})).await.unwrap();
        mem.add(TypedKind::Episodic, "c", 0.9, json!({})).await.unwrap();
        let semantic = mem.list_by_kind(TypedKind::Semantic).await.unwrap();
        assert_eq!(semantic.len(), 2);
        assert_eq!(semantic[0].content, "b");
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let mem = typed();
        mem.add(TypedKind::Semantic, "Likes Green Tea", 0.5, json!({})).await.unwrap();
        mem.add(TypedKind::Semantic, "Dislikes coffee", 0.5, json!({})).await.unwrap();
        let hits = mem.search("tea", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Likes Green Tea");
    }
}
