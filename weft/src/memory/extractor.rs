//! [`AsyncExtractor`]: a fixed worker pool draining a bounded queue of
//! conversation batches handed off by the
//! [`crate::memory::buffer::ConversationBuffer`]. `submit` never blocks the
//! caller — a full queue is reported back as a rejection rather than
//! applying backpressure to the conversation turn in flight.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::message::Message;

/// An extraction job: the batch of messages pending consolidation.
pub type ExtractionBatch = Vec<Message>;

/// A handler invoked by a worker for each dequeued batch. Panics inside the
/// handler are not caught here; wrap guardrail-sensitive work in its own
/// panic boundary if needed.
pub type ExtractionHandler = Arc<dyn Fn(ExtractionBatch) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

/// Bounded-queue, fixed-worker-pool async extraction pipeline.
pub struct AsyncExtractor {
    sender: mpsc::Sender<ExtractionBatch>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncExtractor {
    /// Spawns `worker_count` tasks sharing a queue of capacity
    /// `queue_capacity`, each invoking `handler` for every dequeued batch.
    pub fn new(worker_count: usize, queue_capacity: usize, handler: ExtractionHandler) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            workers.push(tokio::spawn(async move {
                loop {
                    let batch = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };
                    match batch {
                        Some(batch) => handler(batch).await,
                        None => break,
                    }
                }
            }));
        }
        Self { sender, workers }
    }

    /// Enqueues `batch` without blocking. Returns `false` (and drops the
    /// batch, with a logged warning) if the queue is at capacity.
    pub fn submit(&self, batch: ExtractionBatch) -> bool {
        match self.sender.try_send(batch) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("extraction queue full; dropping batch");
                false
            }
        }
    }

    /// Closes the queue and waits for in-flight/queued batches to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn submitted_batches_are_processed_by_the_pool() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let extractor = AsyncExtractor::new(
            2,
            8,
            Arc::new(move |batch: ExtractionBatch| {
                let counter = Arc::clone(&counter_clone);
                Box::pin(async move {
                    counter.fetch_add(batch.len(), Ordering::SeqCst);
                })
            }),
        );
        for i in 0..5 {
            assert!(extractor.submit(vec![Message::user(format!("m{i}"))]));
        }
        extractor.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn submit_rejects_once_queue_capacity_is_exhausted() {
        let extractor = AsyncExtractor::new(
            1,
            1,
            Arc::new(|_: ExtractionBatch| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
            }),
        );
        assert!(extractor.submit(vec![Message::user("a")]));
        // worker immediately picks this up, leaving the queue empty again,
        // so give it a moment to actually start processing before probing.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(extractor.submit(vec![Message::user("b")]));
        assert!(!extractor.submit(vec![Message::user("c")]));
        extractor.shutdown().await;
    }
}
