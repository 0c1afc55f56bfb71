//! [`MemoryRetriever`]: assembles the memory-facing portion of a prompt
//! under a token budget split by ratio across system prompt, memory
//! snippets, and conversation history. Memory snippets are filled
//! greedily in rank order — semantic hits first, then typed entries, then
//! the long-term digest — until the memory share of the budget is spent.

use crate::message::Message;

/// Where a memory snippet came from, in descending priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemorySourceKind {
    Semantic,
    Typed,
    LongTermDigest,
}

/// One candidate snippet offered to the retriever, already rendered to text.
#[derive(Debug, Clone)]
pub struct MemorySource {
    pub kind: MemorySourceKind,
    pub text: String,
}

/// Rough token estimator: no tokenizer dependency, just a chars-per-token
/// heuristic with a fenced-code-block penalty (code tokenizes denser than
/// prose).
pub struct TokenEstimator;

const CHARS_PER_TOKEN: f64 = 2.7;
const FENCED_CODE_MULTIPLIER: f64 = 1.5;

impl TokenEstimator {
    pub fn estimate(text: &str) -> usize {
        let base = text.chars().count() as f64 / CHARS_PER_TOKEN;
        let scaled = if text.contains("```") { base * FENCED_CODE_MULTIPLIER } else { base };
        scaled.ceil() as usize
    }
}

/// Assembled, budget-fitted context ready to hand to an `LlmClient`.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub system: String,
    pub memory: Vec<String>,
    pub history: Vec<Message>,
}

/// Ratio-budgeted assembler. Ratios need not sum to exactly 1.0; each slice
/// gets `ratio * total_budget` tokens.
pub struct MemoryRetriever {
    system_ratio: f64,
    memory_ratio: f64,
    history_ratio: f64,
}

impl Default for MemoryRetriever {
    fn default() -> Self {
        Self {
            system_ratio: 0.3,
            memory_ratio: 0.2,
            history_ratio: 0.5,
        }
    }
}

impl MemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ratios(mut self, system: f64, memory: f64, history: f64) -> Self {
        self.system_ratio = system;
        self.memory_ratio = memory;
        self.history_ratio = history;
        self
    }

    /// Assembles a budget-fitted context. `system_prompt` is truncated from
    /// the end if it alone exceeds its share; memory sources fill greedily
    /// in priority order; history keeps the newest messages that fit,
    /// restored to chronological order.
    pub fn assemble(&self, total_budget: usize, system_prompt: &str, memory_sources: &[MemorySource], history: &[Message]) -> RetrievedContext {
        let system_budget = (total_budget as f64 * self.system_ratio) as usize;
        let memory_budget = (total_budget as f64 * self.memory_ratio) as usize;
        let history_budget = (total_budget as f64 * self.history_ratio) as usize;

        let system = fit_text_to_budget(system_prompt, system_budget);

        let mut ranked: Vec<&MemorySource> = memory_sources.iter().collect();
        ranked.sort_by_key(|s| s.kind);
        let mut memory = Vec::new();
        let mut spent = 0usize;
        for source in ranked {
            let cost = TokenEstimator::estimate(&source.text);
            if spent + cost > memory_budget {
                continue;
            }
            spent += cost;
            memory.push(source.text.clone());
        }

        let mut kept_reversed = Vec::new();
        let mut spent = 0usize;
        for message in history.iter().rev() {
            let cost = TokenEstimator::estimate(message.text());
            if spent + cost > history_budget {
                break;
            }
            spent += cost;
            kept_reversed.push(message.clone());
        }
        kept_reversed.reverse();

        RetrievedContext {
            system,
            memory,
            history: kept_reversed,
        }
    }
}

fn fit_text_to_budget(text: &str, budget: usize) -> String {
    if TokenEstimator::estimate(text) <= budget {
        return text.to_string();
    }
    let max_chars = (budget as f64 * CHARS_PER_TOKEN) as usize;
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_applies_fenced_code_multiplier() {
        let prose = "a".repeat(27);
        let code = format!("```\n{}\n```", "a".repeat(27));
        assert!(TokenEstimator::estimate(&code) > TokenEstimator::estimate(&prose));
    }

    #[test]
    fn memory_sources_fill_in_priority_order_until_budget_exhausted() {
        let retriever = MemoryRetriever::new().with_ratios(0.0, 1.0, 0.0);
        let sources = vec![
            MemorySource {
                kind: MemorySourceKind::LongTermDigest,
                text: "digest".repeat(20),
            },
            MemorySource {
                kind: MemorySourceKind::Semantic,
                text: "semantic hit".to_string(),
            },
            MemorySource {
                kind: MemorySourceKind::Typed,
                text: "typed entry".to_string(),
            },
        ];
        let ctx = retriever.assemble(20, "", &sources, &[]);
        assert_eq!(ctx.memory[0], "semantic hit");
    }

    #[test]
    fn history_keeps_newest_messages_that_fit_in_chronological_order() {
        let retriever = MemoryRetriever::new().with_ratios(0.0, 0.0, 1.0);
        let history = vec![Message::user("a".repeat(50)), Message::user("hi"), Message::user("there")];
        let ctx = retriever.assemble(10, "", &[], &history);
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[0].text(), "hi");
        assert_eq!(ctx.history[1].text(), "there");
    }
}
