//! LoopDetector (C9): detects repeat-args, same-tool-flood, and ping-pong
//! call patterns so the Agent Loop can abort runaway tool-call cycles.

use sha2::{Digest, Sha256};

/// One recorded tool call: name plus a stable fingerprint of its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    fingerprint: String,
}

/// Why the loop detector flagged a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPattern {
    Repeat,
    Flood,
    PingPong,
}

/// Configurable thresholds for [`LoopDetector`].
#[derive(Debug, Clone)]
pub struct LoopDetectorConfig {
    pub max_repeat_calls: usize,
    pub max_same_tool_in_window: usize,
    pub window_size: usize,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            max_repeat_calls: 3,
            max_same_tool_in_window: 5,
            window_size: 10,
        }
    }
}

/// Stable SHA-256 fingerprint over a canonicalized JSON argument map.
fn fingerprint(args: &serde_json::Value) -> String {
    let canonical = canonicalize(args);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Renders JSON with object keys sorted, so key order never changes the
/// fingerprint.
fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Tracks recent tool calls and flags repeat/flood/ping-pong patterns.
pub struct LoopDetector {
    config: LoopDetectorConfig,
    history: Vec<Entry>,
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
        }
    }

    /// Checks whether `(name, args)` would trigger a loop pattern against
    /// the current history, without recording it.
    pub fn check(&self, name: &str, args: &serde_json::Value) -> Option<LoopPattern> {
        let candidate = Entry {
            name: name.to_string(),
            fingerprint: fingerprint(args),
        };

        if self.config.max_repeat_calls > 0 && self.history.len() >= self.config.max_repeat_calls {
            let n = self.config.max_repeat_calls;
            let tail = &self.history[self.history.len() - n..];
            if tail.iter().all(|e| *e == candidate) {
                return Some(LoopPattern::Repeat);
            }
        }

        if self.config.max_same_tool_in_window > 0 {
            let window_start = self.history.len().saturating_sub(self.config.window_size);
            let window = &self.history[window_start..];
            let count = window.iter().filter(|e| e.name == candidate.name).count();
            if count >= self.config.max_same_tool_in_window {
                return Some(LoopPattern::Flood);
            }
        }

        if self.history.len() >= 2 {
            let b = &self.history[self.history.len() - 1];
            let a = &self.history[self.history.len() - 2];
            if a == b {
                // not strictly alternating, can't be a ping-pong suffix
            } else if *a == candidate {
                return Some(LoopPattern::PingPong);
            }
        }

        None
    }

    /// Records a call after it executed. History is trimmed to
    /// `max(20, 2*WindowSize)` entries.
    pub fn record(&mut self, name: &str, args: &serde_json::Value) {
        self.history.push(Entry {
            name: name.to_string(),
            fingerprint: fingerprint(args),
        });
        let cap = std::cmp::max(20, 2 * self.config.window_size);
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(0..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_repeat_after_max_repeat_calls_consecutive_identical() {
        let mut d = LoopDetector::new(LoopDetectorConfig {
            max_repeat_calls: 3,
            max_same_tool_in_window: 100,
            window_size: 50,
        });
        let args = json!({"query": "same"});
        assert_eq!(d.check("search", &args), None);
        d.record("search", &args);
        assert_eq!(d.check("search", &args), None);
        d.record("search", &args);
        assert_eq!(d.check("search", &args), None);
        d.record("search", &args);
        assert_eq!(d.check("search", &args), Some(LoopPattern::Repeat));
    }

    #[test]
    fn flags_flood_when_same_tool_appears_enough_in_window() {
        let mut d = LoopDetector::new(LoopDetectorConfig {
            max_repeat_calls: 100,
            max_same_tool_in_window: 3,
            window_size: 10,
        });
        d.record("t", &json!({"a": 1}));
        d.record("t", &json!({"a": 2}));
        d.record("t", &json!({"a": 3}));
        assert_eq!(d.check("t", &json!({"a": 4})), Some(LoopPattern::Flood));
    }

    #[test]
    fn flags_ping_pong_on_abab_suffix() {
        let mut d = LoopDetector::new(LoopDetectorConfig {
            max_repeat_calls: 100,
            max_same_tool_in_window: 100,
            window_size: 50,
        });
        d.record("a", &json!({"x": 1}));
        d.record("b", &json!({"x": 2}));
        assert_eq!(d.check("a", &json!({"x": 1})), Some(LoopPattern::PingPong));
    }

    #[test]
    fn fingerprint_is_stable_regardless_of_key_order() {
        let a = fingerprint(&json!({"x": 1, "y": 2}));
        let b = fingerprint(&json!({"y": 2, "x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn history_is_trimmed_to_max_20_or_2x_window() {
        let mut d = LoopDetector::new(LoopDetectorConfig {
            max_repeat_calls: 2,
            max_same_tool_in_window: 1000,
            window_size: 5,
        });
        for i in 0..100 {
            d.record("t", &json!({"i": i}));
        }
        assert_eq!(d.history.len(), 20);
    }
}
