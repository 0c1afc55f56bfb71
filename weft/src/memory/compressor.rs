//! [`ContextCompressor`]: keeps the last `window_size` turns verbatim and
//! summarizes everything older once the full history crosses a token
//! threshold. Summaries are cached in working memory under a version tag
//! derived from the summarized slice, so the cache self-invalidates as the
//! conversation moves on without any explicit eviction logic.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::LlmError;
use crate::memory::retriever::TokenEstimator;
use crate::memory::working::WorkingMemory;
use crate::message::Message;

const WORKING_KEY_PREFIX: &str = "compressed_summary:v";

/// Caller-supplied summarization call, typically a thin wrapper around an
/// `LlmClient::invoke`.
pub type Summarizer = Arc<dyn Fn(Vec<Message>) -> BoxFuture<'static, Result<String, LlmError>> + Send + Sync>;

pub struct ContextCompressor {
    working: Arc<WorkingMemory>,
    window_size: usize,
    token_threshold: usize,
}

impl ContextCompressor {
    pub fn new(working: Arc<WorkingMemory>, window_size: usize, token_threshold: usize) -> Self {
        Self {
            working,
            window_size,
            token_threshold,
        }
    }

    fn version_tag(head: &[Message]) -> String {
        let mut hasher = DefaultHasher::new();
        head.len().hash(&mut hasher);
        for message in head {
            message.text().hash(&mut hasher);
        }
        format!("{WORKING_KEY_PREFIX}{:x}", hasher.finish())
    }

    /// Returns `history` unchanged if it fits the threshold, or a
    /// `[summary message, ...tail]` slice otherwise. On summarization
    /// failure (cache miss and the summarizer errors), falls back to the
    /// original, uncompressed history.
    pub async fn compress(&self, history: &[Message], summarize: Summarizer) -> Vec<Message> {
        let total_tokens: usize = history.iter().map(|m| TokenEstimator::estimate(m.text())).sum();
        if total_tokens <= self.token_threshold || history.len() <= self.window_size {
            return history.to_vec();
        }

        let split = history.len() - self.window_size;
        let head = &history[..split];
        let tail = &history[split..];
        let key = Self::version_tag(head);

        if let Ok(Some(cached)) = self.working.get(&key).await {
            let mut result = vec![Message::system(cached)];
            result.extend_from_slice(tail);
            return result;
        }

        match summarize(head.to_vec()).await {
            Ok(summary) => {
                let _ = self.working.set(&key, &summary).await;
                let mut result = vec![Message::system(summary)];
                result.extend_from_slice(tail);
                result
            }
            Err(_) => history.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::InMemoryMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn compressor(window: usize, threshold: usize) -> ContextCompressor {
        let store = Arc::new(InMemoryMemoryStore::new());
        ContextCompressor::new(Arc::new(WorkingMemory::new(store, "agent:user")), window, threshold)
    }

    fn long_history(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("message number {i} with enough text to count"))).collect()
    }

    #[tokio::test]
    async fn under_threshold_history_is_returned_unchanged() {
        let compressor = compressor(2, 10_000);
        let history = long_history(5);
        let summarize: Summarizer = Arc::new(|_| Box::pin(async { panic!("should not be called") }));
        let result = compressor.compress(&history, summarize).await;
        assert_eq!(result.len(), 5);
    }

    #[tokio::test]
    async fn over_threshold_history_is_summarized_and_tail_kept_verbatim() {
        let compressor = compressor(2, 1);
        let history = long_history(10);
        let summarize: Summarizer = Arc::new(|_| Box::pin(async { Ok("summary of the past".to_string()) }));
        let result = compressor.compress(&history, summarize).await;
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].text(), "summary of the past");
        assert_eq!(result[1].text(), history[8].text());
        assert_eq!(result[2].text(), history[9].text());
    }

    #[tokio::test]
    async fn repeated_calls_with_the_same_head_hit_the_cache() {
        let compressor = compressor(2, 1);
        let history = long_history(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let summarize: Summarizer = Arc::new(move |_| {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("cached summary".to_string())
            })
        });
        compressor.compress(&history, summarize.clone()).await;
        compressor.compress(&history, summarize).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_uncompressed_history() {
        let compressor = compressor(2, 1);
        let history = long_history(10);
        let summarize: Summarizer = Arc::new(|_| Box::pin(async { Err(LlmError::new("boom")) }));
        let result = compressor.compress(&history, summarize).await;
        assert_eq!(result.len(), 10);
    }
}
