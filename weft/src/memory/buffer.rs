//! [`ConversationBuffer`]: accumulates turns in-process until a trigger
//! policy (message count or elapsed time) fires, at which point the caller
//! drains it atomically and hands the batch to the
//! [`crate::memory::extractor::AsyncExtractor`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::message::Message;

/// When a full buffer should be offered for extraction.
#[derive(Debug, Clone, Copy)]
pub struct TriggerPolicy {
    pub max_messages: usize,
    pub max_interval: Duration,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            max_messages: 10,
            max_interval: Duration::from_secs(300),
        }
    }
}

struct Inner {
    messages: Vec<Message>,
    since: Instant,
}

/// Process-local accumulator of conversation turns pending extraction.
pub struct ConversationBuffer {
    policy: TriggerPolicy,
    inner: Mutex<Inner>,
}

impl ConversationBuffer {
    pub fn new(policy: TriggerPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                messages: Vec::new(),
                since: Instant::now(),
            }),
        }
    }

    /// Appends `message` and reports whether the trigger policy now fires.
    pub fn push(&self, message: Message) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.messages.push(message);
        inner.messages.len() >= self.policy.max_messages || inner.since.elapsed() >= self.policy.max_interval
    }

    /// Atomically returns and empties the buffered messages, resetting the
    /// interval clock.
    pub fn drain(&self) -> Vec<Message> {
        let mut inner = self.inner.lock().unwrap();
        inner.since = Instant::now();
        std::mem::take(&mut inner.messages)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_triggers_once_max_messages_is_reached() {
        let buf = ConversationBuffer::new(TriggerPolicy {
            max_messages: 3,
            max_interval: Duration::from_secs(3600),
        });
        assert!(!buf.push(Message::user("1")));
        assert!(!buf.push(Message::user("2")));
        assert!(buf.push(Message::user("3")));
    }

    #[test]
    fn drain_empties_the_buffer_and_resets_clock() {
        let buf = ConversationBuffer::new(TriggerPolicy::default());
        buf.push(Message::user("a"));
        buf.push(Message::user("b"));
        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn time_based_trigger_fires_once_interval_elapses() {
        let buf = ConversationBuffer::new(TriggerPolicy {
            max_messages: 1000,
            max_interval: Duration::from_millis(1),
        });
        buf.push(Message::user("a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(buf.push(Message::user("b")));
    }
}
