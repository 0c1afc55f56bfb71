//! Natural Conversation Pipeline (C11): pre/post-processing stages wrapped
//! around one Agent Loop turn — state → emotion → opener → loop → style
//! post-process.
//!
//! Grounded on the teacher's node-wrapping shape (`WithNodeLogging`,
//! `ActNode`'s error-handling wrapper in `graphweave/src/agent/react`),
//! generalized from one wrapped node to three cooperating, independently
//! swappable stages plus the existing C4 context compressor rather than a
//! fourth bespoke summarizer.

use tokio_util::sync::CancellationToken;

use crate::agent::AgentLoop;
use crate::error::RunError;
use crate::message::Message;

/// Coarse conversational phase, derived from turn count and the presence of
/// terminal/greeting phrases. Exposed so callers can adapt system-prompt
/// framing without re-deriving it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Opening,
    Exploring,
    Resolving,
    Closing,
}

const CLOSING_PHRASES: &[&str] = &["bye", "goodbye", "thanks, that's all", "thank you, that's all", "see you"];
const GREETING_PHRASES: &[&str] = &["hi", "hello", "hey"];

/// Derives [`ConversationState`] from the running turn count and the
/// latest user message's surface form.
pub struct ConversationStateTracker {
    turn_count: usize,
}

impl ConversationStateTracker {
    pub fn new() -> Self {
        Self { turn_count: 0 }
    }

    pub fn observe(&mut self, user_text: &str) -> ConversationState {
        self.turn_count += 1;
        let lower = user_text.to_lowercase();

        if CLOSING_PHRASES.iter().any(|p| lower.contains(p)) {
            return ConversationState::Closing;
        }
        if self.turn_count == 1 && GREETING_PHRASES.iter().any(|p| lower.contains(p)) {
            return ConversationState::Opening;
        }
        if self.turn_count == 1 {
            return ConversationState::Opening;
        }
        ConversationState::Exploring
    }
}

impl Default for ConversationStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight emotional read on the latest user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Neutral,
    Positive,
    Negative,
    Frustrated,
    Excited,
}

/// A trait so callers can swap in an LLM-backed detector without touching
/// the pipeline.
pub trait EmotionDetector: Send + Sync {
    fn detect(&self, user_text: &str) -> Emotion;
}

/// Keyword/lexicon-based default detector.
pub struct KeywordEmotionDetector;

impl EmotionDetector for KeywordEmotionDetector {
    fn detect(&self, user_text: &str) -> Emotion {
        let lower = user_text.to_lowercase();
        let frustrated = ["ugh", "this is broken", "annoying", "frustrated", "not working"];
        let negative = ["sad", "upset", "worried", "bad", "angry"];
        let excited = ["awesome", "amazing", "can't wait", "excited", "!!"];
        let positive = ["great", "thanks", "happy", "good", "love it"];

        if frustrated.iter().any(|p| lower.contains(p)) {
            Emotion::Frustrated
        } else if excited.iter().any(|p| lower.contains(p)) {
            Emotion::Excited
        } else if negative.iter().any(|p| lower.contains(p)) {
            Emotion::Negative
        } else if positive.iter().any(|p| lower.contains(p)) {
            Emotion::Positive
        } else {
            Emotion::Neutral
        }
    }
}

/// For the first turn of a session only, produces a short contextual opener
/// from the state/emotion reads.
pub struct OpenerGenerator;

impl OpenerGenerator {
    pub fn opener(state: ConversationState, emotion: Emotion) -> Option<String> {
        if state != ConversationState::Opening {
            return None;
        }
        match emotion {
            Emotion::Frustrated | Emotion::Negative => Some("I can tell this has been frustrating — let's sort it out.".to_string()),
            Emotion::Excited | Emotion::Positive => Some("Glad you're here — let's dig in.".to_string()),
            Emotion::Neutral => None,
        }
    }
}

/// Pure-text post-processing: sentence cap, de-echo, tone template.
pub struct StylePostProcessor {
    pub max_sentences: usize,
    pub add_exclamation: bool,
}

impl StylePostProcessor {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences,
            add_exclamation: false,
        }
    }

    pub fn with_exclamation(mut self, add_exclamation: bool) -> Self {
        self.add_exclamation = add_exclamation;
        self
    }

    pub fn process(&self, user_text: &str, assistant_text: &str) -> String {
        let deduped = Self::strip_echo(user_text, assistant_text);
        let trimmed = Self::cap_sentences(&deduped, self.max_sentences);
        if self.add_exclamation && !trimmed.is_empty() && !trimmed.ends_with('!') {
            format!("{}!", trimmed.trim_end_matches('.'))
        } else {
            trimmed
        }
    }

    fn strip_echo(user_text: &str, assistant_text: &str) -> String {
        let user_trimmed = user_text.trim().trim_end_matches(['.', '!', '?']);
        let assistant_trimmed = assistant_text.trim();
        if !user_trimmed.is_empty() && assistant_trimmed.to_lowercase().starts_with(&user_trimmed.to_lowercase()) {
            assistant_trimmed[user_trimmed.len()..].trim_start_matches([',', ' ', '-']).to_string()
        } else {
            assistant_trimmed.to_string()
        }
    }

    fn cap_sentences(text: &str, max_sentences: usize) -> String {
        if max_sentences == 0 {
            return text.to_string();
        }
        let mut sentences = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            current.push(ch);
            if matches!(ch, '.' | '!' | '?') {
                sentences.push(current.trim().to_string());
                current.clear();
                if sentences.len() == max_sentences {
                    return sentences.join(" ");
                }
            }
        }
        if !current.trim().is_empty() {
            sentences.push(current.trim().to_string());
        }
        sentences.join(" ")
    }
}

/// Orchestrates one turn: state → emotion → opener → Agent Loop → style
/// post-process. The emotion/opener stages never touch the loop's
/// guardrail/tool/tracing machinery — they only shape the text in and out.
pub struct ConversationPipeline {
    state_tracker: ConversationStateTracker,
    emotion_detector: Box<dyn EmotionDetector>,
    style: StylePostProcessor,
}

impl ConversationPipeline {
    pub fn new(style: StylePostProcessor) -> Self {
        Self {
            state_tracker: ConversationStateTracker::new(),
            emotion_detector: Box::new(KeywordEmotionDetector),
            style,
        }
    }

    pub fn with_emotion_detector(mut self, detector: Box<dyn EmotionDetector>) -> Self {
        self.emotion_detector = detector;
        self
    }

    /// Runs one turn through the wrapped [`AgentLoop`], applying the opener
    /// on the session's first turn and style post-processing on the way out.
    pub async fn turn(
        &mut self,
        agent_loop: &AgentLoop,
        cancellation: &CancellationToken,
        user_text: &str,
        history: &[Message],
    ) -> Result<String, RunError> {
        let state = self.state_tracker.observe(user_text);
        let emotion = self.emotion_detector.detect(user_text);
        let opener = OpenerGenerator::opener(state, emotion);

        let run_result = agent_loop.run(cancellation, user_text, history, opener.as_deref()).await?;
        Ok(self.style.process(user_text, &run_result.final_output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_turn_is_opening_then_subsequent_turns_are_exploring() {
        let mut tracker = ConversationStateTracker::new();
        assert_eq!(tracker.observe("hello there"), ConversationState::Opening);
        assert_eq!(tracker.observe("tell me more"), ConversationState::Exploring);
    }

    #[test]
    fn closing_phrase_is_detected_regardless_of_turn_count() {
        let mut tracker = ConversationStateTracker::new();
        tracker.observe("hi");
        assert_eq!(tracker.observe("thanks, that's all"), ConversationState::Closing);
    }

    #[test]
    fn keyword_detector_flags_frustration() {
        let detector = KeywordEmotionDetector;
        assert_eq!(detector.detect("this is broken and annoying"), Emotion::Frustrated);
        assert_eq!(detector.detect("thanks, great work"), Emotion::Positive);
        assert_eq!(detector.detect("what time is it"), Emotion::Neutral);
    }

    #[test]
    fn opener_is_only_produced_on_opening_state() {
        assert!(OpenerGenerator::opener(ConversationState::Opening, Emotion::Frustrated).is_some());
        assert!(OpenerGenerator::opener(ConversationState::Exploring, Emotion::Frustrated).is_none());
        assert!(OpenerGenerator::opener(ConversationState::Opening, Emotion::Neutral).is_none());
    }

    #[test]
    fn style_post_processor_caps_sentences_and_strips_echo() {
        let style = StylePostProcessor::new(2);
        let out = style.process("what's the weather", "what's the weather, it's sunny today. Expect highs of 25. Rain tomorrow.");
        assert_eq!(out, "it's sunny today. Expect highs of 25.");
    }
}
