//! Memory subsystem (C1–C4): a four-layer model over a [`MemoryStore`]
//! capability set — working, short-term, long-term structured, and typed —
//! plus the buffering/extraction pipeline that keeps long-term memory fresh
//! and the retriever/compressor that assemble prompt-facing text under a
//! token budget.
//!
//! Layer taxonomy, narrowest to broadest scope:
//! - [`working::WorkingMemory`] — per-process, per-session scratchpad, lost
//!   on restart.
//! - [`short_term::ShortTermMemory`] — bounded, persisted list of recent
//!   turns.
//! - [`long_term::LongTermMemory`] — persisted structured JSON document,
//!   updated by deep-merge or fact-level operations.
//! - [`typed::TypedMemory`] — classified, scored memory entries (semantic /
//!   episodic / procedural).

pub mod buffer;
pub mod compressor;
pub mod consolidator;
pub mod embedding;
pub mod extractor;
pub mod long_term;
pub mod retriever;
pub mod short_term;
pub mod store;
pub mod typed;
pub mod working;

#[cfg(not(target_arch = "wasm32"))]
pub mod sqlite_store;

pub use buffer::ConversationBuffer;
pub use compressor::ContextCompressor;
pub use consolidator::{Consolidator, MemoryOperation, MemoryOperationAction};
pub use embedding::{EmbeddingHit, EmbeddingStore};
pub use extractor::AsyncExtractor;
pub use long_term::LongTermMemory;
pub use retriever::{MemoryRetriever, TokenEstimator};
pub use short_term::ShortTermMemory;
pub use store::{InMemoryMemoryStore, MemoryStore};
pub use typed::{TypedEntry, TypedKind, TypedMemory};
pub use working::WorkingMemory;

/// A `<agent_id>:<user_id>`-style prefix used to isolate state between
/// agents and users in a shared [`MemoryStore`].
pub fn namespace(agent_id: &str, user_id: &str) -> String {
    format!("{agent_id}:{user_id}")
}
