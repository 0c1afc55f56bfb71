//! SQLite-backed [`MemoryStore`]: persistent across process restarts.
//! Follows the teacher's `SqliteStore` pattern of opening a fresh connection
//! per operation inside `spawn_blocking`, rather than holding one connection
//! behind a lock across awaits.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::params;

use crate::error::StoreError;
use crate::memory::store::MemoryStore;

/// SQLite-backed [`MemoryStore`]. Scalars live in `store_kv`; list entries
/// live in `store_list` ordered by an auto-increment `seq`.
pub struct SqliteMemoryStore {
    db_path: PathBuf,
}

impl SqliteMemoryStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_kv (
                ns TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (ns, key)
            );
            CREATE TABLE IF NOT EXISTS store_list (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                ns TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS store_list_ns_key ON store_list(ns, key, seq);
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get(&self, ns: &str, key: &str) -> Result<String, StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM store_kv WHERE ns = ?1 AND key = ?2",
                    params![ns, key],
                    |row| row.get(0),
                )
                .ok();
            Ok(value.unwrap_or_default())
        })
        .await
    }

    async fn set(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO store_kv (ns, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(ns, key) DO UPDATE SET value = excluded.value",
                params![ns, key, value],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM store_kv WHERE ns = ?1 AND key = ?2", params![ns, key])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list_keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let ns = ns.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT key FROM store_kv WHERE ns = ?1")
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![ns], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut keys = Vec::new();
            for row in rows {
                keys.push(row.map_err(|e| StoreError::Storage(e.to_string()))?);
            }
            Ok(keys)
        })
        .await
    }

    async fn append(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO store_list (ns, key, value) VALUES (?1, ?2, ?3)",
                params![ns, key, value],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get_list(
        &self,
        ns: &str,
        key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let limit_sql = if limit == 0 { i64::MAX } else { limit as i64 };
            let mut stmt = conn
                .prepare(
                    "SELECT value FROM store_list WHERE ns = ?1 AND key = ?2 ORDER BY seq
                     LIMIT ?3 OFFSET ?4",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![ns, key, limit_sql, offset as i64], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut values = Vec::new();
            for row in rows {
                values.push(row.map_err(|e| StoreError::Storage(e.to_string()))?);
            }
            Ok(values)
        })
        .await
    }

    async fn trim_list(&self, ns: &str, key: &str, max_size: usize) -> Result<(), StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let total: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM store_list WHERE ns = ?1 AND key = ?2",
                    params![ns, key],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let excess = total - max_size as i64;
            if excess > 0 {
                conn.execute(
                    "DELETE FROM store_list WHERE seq IN (
                        SELECT seq FROM store_list WHERE ns = ?1 AND key = ?2 ORDER BY seq LIMIT ?3
                    )",
                    params![ns, key, excess],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
            Ok(())
        })
        .await
    }

    async fn clear_list(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM store_list WHERE ns = ?1 AND key = ?2", params![ns, key])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list_length(&self, ns: &str, key: &str) -> Result<usize, StoreError> {
        let ns = ns.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let total: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM store_list WHERE ns = ?1 AND key = ?2",
                    params![ns, key],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(total as usize)
        })
        .await
    }
}
