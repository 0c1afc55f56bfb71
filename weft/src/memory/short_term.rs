//! [`ShortTermMemory`]: a bounded, persisted list of recent conversation
//! turns per namespace. Appends auto-trim to `max_messages`; reads return
//! oldest-to-newest, matching [`crate::message::Message`] JSON ordering.

use std::sync::Arc;

use serde_json::Value;

use crate::error::StoreError;
use crate::memory::store::MemoryStore;
use crate::message::Message;

const LIST_KEY: &str = "short_term:turns";

/// Recent-turn buffer, bounded to `max_messages` entries per namespace.
pub struct ShortTermMemory {
    store: Arc<dyn MemoryStore>,
    namespace: String,
    max_messages: usize,
}

impl ShortTermMemory {
    pub fn new(store: Arc<dyn MemoryStore>, namespace: impl Into<String>, max_messages: usize) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            max_messages,
        }
    }

    pub async fn append(&self, message: &Message) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(message)?;
        self.store.append(&self.namespace, LIST_KEY, &encoded).await?;
        self.store.trim_list(&self.namespace, LIST_KEY, self.max_messages).await
    }

    /// Returns the `limit` most recent messages (0 = all), oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let total = self.store.list_length(&self.namespace, LIST_KEY).await?;
        let offset = if limit == 0 || limit >= total { 0 } else { total - limit };
        let raw = self.store.get_list(&self.namespace, LIST_KEY, 0, offset).await?;
        raw.iter()
            .map(|s| serde_json::from_str::<Message>(s).map_err(StoreError::from))
            .collect()
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear_list(&self.namespace, LIST_KEY).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.list_length(&self.namespace, LIST_KEY).await
    }

    /// Raw JSON dump of the buffer, for diagnostics/export.
    pub async fn as_json(&self) -> Result<Vec<Value>, StoreError> {
        let messages = self.recent(0).await?;
        Ok(messages.into_iter().map(|m| serde_json::to_value(m).unwrap_or(Value::Null)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::InMemoryMemoryStore;

    fn short_term(max: usize) -> ShortTermMemory {
        ShortTermMemory::new(Arc::new(InMemoryMemoryStore::new()), "agent:user", max)
    }

    #[tokio::test]
    async fn append_auto_trims_to_max_messages() {
        let mem = short_term(3);
        for i in 0..5 {
            mem.append(&Message::user(format!("m{i}"))).await.unwrap();
        }
        assert_eq!(mem.len().await.unwrap(), 3);
        let recent = mem.recent(0).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn recent_returns_oldest_to_newest_within_limit() {
        let mem = short_term(10);
        for i in 0..5 {
            mem.append(&Message::user(format!("m{i}"))).await.unwrap();
        }
        let recent = mem.recent(2).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn clear_empties_the_buffer() {
        let mem = short_term(10);
        mem.append(&Message::user("a")).await.unwrap();
        mem.clear().await.unwrap();
        assert_eq!(mem.len().await.unwrap(), 0);
    }
}
