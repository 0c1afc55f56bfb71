//! `EmbeddingStore` (spec §6, optional): the vector-search capability set
//! the [`crate::memory::retriever::MemoryRetriever`] prefers over typed
//! memories when configured. `InMemoryEmbeddingStore` is the default,
//! cosine-similarity test double; the `lance` feature adds a persistent
//! LanceDB-backed implementation grounded on the teacher's `LanceStore`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// One ranked hit from [`EmbeddingStore::search`].
#[derive(Debug, Clone)]
pub struct EmbeddingHit {
    pub id: String,
    pub score: f64,
    pub content: String,
    pub metadata: Value,
}

/// Optional vector-search capability a deployment can wire in for semantic
/// memory retrieval.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: Vec<f32>, content: &str, metadata: Value) -> Result<(), StoreError>;
    async fn search(&self, query_vec: &[f32], top_k: usize, filter: Option<&Value>) -> Result<Vec<EmbeddingHit>, StoreError>;
    async fn delete(&self, ids: &[String]) -> Result<(), StoreError>;
    async fn delete_by_metadata(&self, filter: &Value) -> Result<(), StoreError>;
}

struct Entry {
    vector: Vec<f32>,
    content: String,
    metadata: Value,
}

/// In-process cosine-similarity embedding store, for tests and for
/// deployments without a vector database.
#[derive(Default)]
pub struct InMemoryEmbeddingStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

/// Matches `filter` against `metadata`: every key in `filter` must be
/// present in `metadata` with an equal value. `None`/empty filter matches
/// everything.
fn matches_filter(metadata: &Value, filter: &Value) -> bool {
    let Some(filter_obj) = filter.as_object() else { return true };
    let Some(meta_obj) = metadata.as_object() else { return filter_obj.is_empty() };
    filter_obj.iter().all(|(k, v)| meta_obj.get(k) == Some(v))
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, content: &str, metadata: Value) -> Result<(), StoreError> {
        self.entries.write().unwrap().insert(
            id.to_string(),
            Entry {
                vector,
                content: content.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], top_k: usize, filter: Option<&Value>) -> Result<Vec<EmbeddingHit>, StoreError> {
        let entries = self.entries.read().unwrap();
        let mut hits: Vec<EmbeddingHit> = entries
            .iter()
            .filter(|(_, e)| filter.map(|f| matches_filter(&e.metadata, f)).unwrap_or(true))
            .map(|(id, e)| EmbeddingHit {
                id: id.clone(),
                score: cosine_similarity(query_vec, &e.vector),
                content: e.content.clone(),
                metadata: e.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap();
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }

    async fn delete_by_metadata(&self, filter: &Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, e| !matches_filter(&e.metadata, filter));
        Ok(())
    }
}

#[cfg(feature = "lance")]
pub mod lance {
    //! LanceDB-backed [`EmbeddingStore`], grounded on the teacher's
    //! `LanceStore` (`loom/src/memory/lance_store.rs`): one flat table of
    //! `(id, content, metadata, vector)` rows, `delete` by predicate before
    //! re-insert for upsert semantics, `nearest_to` for ANN search.

    use std::path::Path;
    use std::sync::Arc;

    use arrow_array::types::Float32Type;
    use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use lancedb::connection::Connection;
    use lancedb::query::{ExecutableQuery, QueryBase};
    use serde_json::Value;

    use super::{EmbeddingHit, EmbeddingStore};
    use crate::error::StoreError;

    const TABLE_NAME: &str = "weft_embeddings";

    fn escape_sql(s: &str) -> String {
        s.replace('\'', "''")
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
                false,
            ),
        ]))
    }

    /// Persistent vector store backed by an on-disk LanceDB database.
    pub struct LanceEmbeddingStore {
        conn: Connection,
        dimension: usize,
    }

    impl LanceEmbeddingStore {
        pub async fn new(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
            let path_str = path.as_ref().to_str().ok_or_else(|| StoreError::Storage("path must be valid UTF-8".into()))?;
            let conn = lancedb::connect(path_str).execute().await.map_err(|e| StoreError::Storage(e.to_string()))?;
            if conn.open_table(TABLE_NAME).execute().await.is_err() {
                conn.create_empty_table(TABLE_NAME, schema(dimension))
                    .execute()
                    .await
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
            Ok(Self { conn, dimension })
        }

        async fn table(&self) -> Result<lancedb::Table, StoreError> {
            self.conn.open_table(TABLE_NAME).execute().await.map_err(|e| StoreError::Storage(e.to_string()))
        }
    }

    #[async_trait]
    impl EmbeddingStore for LanceEmbeddingStore {
        async fn upsert(&self, id: &str, vector: Vec<f32>, content: &str, metadata: Value) -> Result<(), StoreError> {
            if vector.len() != self.dimension {
                return Err(StoreError::Storage(format!("vector dimension {} != expected {}", vector.len(), self.dimension)));
            }
            let table = self.table().await?;
            table
                .delete(&format!("id = '{}'", escape_sql(id)))
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let metadata_str = serde_json::to_string(&metadata)?;
            let batch = RecordBatch::try_new(
                schema(self.dimension),
                vec![
                    Arc::new(StringArray::from(vec![id])),
                    Arc::new(StringArray::from(vec![content])),
                    Arc::new(StringArray::from(vec![metadata_str.as_str()])),
                    Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                        std::iter::once(Some(vector.into_iter().map(Some).collect::<Vec<_>>())),
                        self.dimension as i32,
                    )),
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            let iter = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema(self.dimension));
            table.add(iter).execute().await.map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        }

        async fn search(&self, query_vec: &[f32], top_k: usize, filter: Option<&Value>) -> Result<Vec<EmbeddingHit>, StoreError> {
            let table = self.table().await?;
            let mut query = table.query().nearest_to(query_vec).map_err(|e| StoreError::Storage(e.to_string()))?.limit(top_k);
            // Metadata filtering is applied post-fetch (LanceDB predicates operate on
            // flat columns; our metadata column is an opaque JSON blob).
            let stream = query.execute().await.map_err(|e| StoreError::Storage(e.to_string()))?;
            let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut hits = Vec::new();
            for batch in batches {
                let id_col = batch.column_by_name("id").unwrap().as_any().downcast_ref::<StringArray>().unwrap();
                let content_col = batch.column_by_name("content").unwrap().as_any().downcast_ref::<StringArray>().unwrap();
                let meta_col = batch.column_by_name("metadata").unwrap().as_any().downcast_ref::<StringArray>().unwrap();
                let score_col = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>().cloned());
                for i in 0..batch.num_rows() {
                    let metadata: Value = serde_json::from_str(meta_col.value(i)).unwrap_or(Value::Null);
                    if let Some(f) = filter {
                        if !super::matches_filter(&metadata, f) {
                            continue;
                        }
                    }
                    hits.push(EmbeddingHit {
                        id: id_col.value(i).to_string(),
                        content: content_col.value(i).to_string(),
                        metadata,
                        score: score_col.as_ref().map(|c| c.value(i) as f64).unwrap_or(0.0),
                    });
                }
            }
            Ok(hits)
        }

        async fn delete(&self, ids: &[String]) -> Result<(), StoreError> {
            let table = self.table().await?;
            for id in ids {
                table
                    .delete(&format!("id = '{}'", escape_sql(id)))
                    .await
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
            Ok(())
        }

        async fn delete_by_metadata(&self, filter: &Value) -> Result<(), StoreError> {
            // No flat column to predicate on; scan, collect matching ids, delete by id.
            let table = self.table().await?;
            let stream = table.query().execute().await.map_err(|e| StoreError::Storage(e.to_string()))?;
            let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut ids = Vec::new();
            for batch in batches {
                let id_col = batch.column_by_name("id").unwrap().as_any().downcast_ref::<StringArray>().unwrap();
                let meta_col = batch.column_by_name("metadata").unwrap().as_any().downcast_ref::<StringArray>().unwrap();
                for i in 0..batch.num_rows() {
                    let metadata: Value = serde_json::from_str(meta_col.value(i)).unwrap_or(Value::Null);
                    if super::matches_filter(&metadata, filter) {
                        ids.push(id_col.value(i).to_string());
                    }
                }
            }
            self.delete(&ids).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity_descending() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert("a", vec![1.0, 0.0], "a", json!({})).await.unwrap();
        store.upsert("b", vec![0.0, 1.0], "b", json!({})).await.unwrap();
        let hits = store.search(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn filter_restricts_to_matching_metadata() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert("a", vec![1.0, 0.0], "a", json!({"kind": "fact"})).await.unwrap();
        store.upsert("b", vec![1.0, 0.0], "b", json!({"kind": "note"})).await.unwrap();
        let hits = store.search(&[1.0, 0.0], 10, Some(&json!({"kind": "fact"}))).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn delete_removes_entries() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert("a", vec![1.0], "a", json!({})).await.unwrap();
        store.delete(&["a".to_string()]).await.unwrap();
        let hits = store.search(&[1.0], 10, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_metadata_removes_matching_entries_only() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert("a", vec![1.0], "a", json!({"kind": "fact"})).await.unwrap();
        store.upsert("b", vec![1.0], "b", json!({"kind": "note"})).await.unwrap();
        store.delete_by_metadata(&json!({"kind": "fact"})).await.unwrap();
        let hits = store.search(&[1.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }
}
