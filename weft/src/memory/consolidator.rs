//! [`Consolidator`]: turns an extraction LLM's free-form reply into
//! [`MemoryOperation`]s applied against a long-term document by dot-path.
//! Tolerates a JSON array embedded in prose or fenced in a ```json block;
//! when no array can be recovered at all, falls back to a flat deep-merge
//! of whatever JSON object the text does contain.

use serde_json::{Map, Value};

use crate::memory::long_term::deep_merge;

/// What a single [`MemoryOperation`] does to the document at its `path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOperationAction {
    Add,
    Update,
    Delete,
    Noop,
}

/// One fact-level edit extracted from an LLM's consolidation reply.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemoryOperation {
    pub action: MemoryOperationAction,
    /// Dot-separated path into the document, e.g. `"preferences.drink"`.
    /// Must be non-empty for `Add`/`Update`/`Delete`; ignored for `Noop`.
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

/// Applies extracted [`MemoryOperation`]s (or a raw-object fallback merge)
/// to a long-term document.
pub struct Consolidator;

impl Consolidator {
    pub fn new() -> Self {
        Self
    }

    /// Extracts a JSON array of operations from `text`, preferring a fenced
    /// ```json block, then any bracket-balanced `[...]` substring. Returns
    /// `None` if no array could be parsed at all (caller should fall back
    /// to [`Consolidator::apply_fallback_merge`]).
    pub fn parse_operations(&self, text: &str) -> Option<Vec<MemoryOperation>> {
        let candidate = extract_fenced_json(text).or_else(|| extract_bracket_balanced(text, '[', ']'))?;
        serde_json::from_str::<Vec<MemoryOperation>>(&candidate).ok()
    }

    /// Applies each operation to `doc` in order, skipping `Noop` and any
    /// operation with an empty `path`.
    pub fn apply(&self, doc: &mut Value, ops: &[MemoryOperation]) {
        if !doc.is_object() {
            *doc = Value::Object(Map::new());
        }
        for op in ops {
            if op.path.is_empty() || op.action == MemoryOperationAction::Noop {
                continue;
            }
            match op.action {
                MemoryOperationAction::Add | MemoryOperationAction::Update => set_by_path(doc, &op.path, op.value.clone()),
                MemoryOperationAction::Delete => delete_by_path(doc, &op.path),
                MemoryOperationAction::Noop => {}
            }
        }
    }

    /// Flat deep-merge fallback used when `text` contains no parseable
    /// operations array: any top-level JSON object found in `text` is
    /// merged wholesale into `doc`.
    pub fn apply_fallback_merge(&self, doc: &mut Value, text: &str) {
        if !doc.is_object() {
            *doc = Value::Object(Map::new());
        }
        let Some(candidate) = extract_fenced_json(text).or_else(|| extract_bracket_balanced(text, '{', '}')) else {
            return;
        };
        if let Ok(patch) = serde_json::from_str::<Value>(&candidate) {
            if patch.is_object() {
                deep_merge(doc, &patch);
            }
        }
    }

    /// Consolidates `text` into `doc`: extracted operations if any parse,
    /// else the flat-merge fallback.
    pub fn consolidate(&self, doc: &mut Value, text: &str) {
        match self.parse_operations(text) {
            Some(ops) => self.apply(doc, &ops),
            None => self.apply_fallback_merge(doc, text),
        }
    }
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_fenced_json(text: &str) -> Option<String> {
    let start = text.find("```json")?;
    let after = &text[start + "```json".len()..];
    let end = after.find("```")?;
    Some(after[..end].trim().to_string())
}

/// Scans for the first `open`, then returns the substring up to its
/// matching `close`, accounting for nested brackets of the same kind.
fn extract_bracket_balanced(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let mut depth = 0i32;
    for (i, c) in text[start..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(text[start..start + i + c.len_utf8()].to_string());
            }
        }
    }
    None
}

fn set_by_path(doc: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut cursor = doc;
    for (i, part) in parts.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let obj = cursor.as_object_mut().unwrap();
        if i == parts.len() - 1 {
            obj.insert(part.to_string(), value);
            return;
        }
        cursor = obj.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
}

fn delete_by_path(doc: &mut Value, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut cursor = doc;
    for (i, part) in parts.iter().enumerate() {
        let Some(obj) = cursor.as_object_mut() else { return };
        if i == parts.len() - 1 {
            obj.remove(*part);
            return;
        }
        let Some(next) = obj.get_mut(*part) else { return };
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_json_array_of_operations() {
        let text = "Here's what I found:\n```json\n[{\"action\": \"update\", \"path\": \"name\", \"value\": \"Ada\"}]\n```\nThanks.";
        let c = Consolidator::new();
        let ops = c.parse_operations(text).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "name");
    }

    #[test]
    fn parses_bare_array_embedded_in_prose() {
        let text = "sure: [{\"action\": \"add\", \"path\": \"preferences.drink\", \"value\": \"tea\"}] done";
        let c = Consolidator::new();
        let ops = c.parse_operations(text).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].action, MemoryOperationAction::Add);
    }

    #[test]
    fn apply_sets_nested_dot_path_creating_intermediate_objects() {
        let c = Consolidator::new();
        let mut doc = json!({});
        c.apply(
            &mut doc,
            &[MemoryOperation {
                action: MemoryOperationAction::Update,
                path: "preferences.drink".into(),
                value: json!("tea"),
            }],
        );
        assert_eq!(doc["preferences"]["drink"], "tea");
    }

    #[test]
    fn apply_delete_removes_the_leaf_key() {
        let c = Consolidator::new();
        let mut doc = json!({"preferences": {"drink": "tea"}});
        c.apply(
            &mut doc,
            &[MemoryOperation {
                action: MemoryOperationAction::Delete,
                path: "preferences.drink".into(),
                value: Value::Null,
            }],
        );
        assert!(doc["preferences"].as_object().unwrap().is_empty());
    }

    #[test]
    fn apply_skips_noop_and_empty_path() {
        let c = Consolidator::new();
        let mut doc = json!({"a": 1});
        c.apply(
            &mut doc,
            &[
                MemoryOperation {
                    action: MemoryOperationAction::Noop,
                    path: "a".into(),
                    value: json!(2),
                },
                MemoryOperation {
                    action: MemoryOperationAction::Update,
                    path: "".into(),
                    value: json!(3),
                },
            ],
        );
        assert_eq!(doc["a"], 1);
    }

    #[test]
    fn total_parse_failure_falls_back_to_flat_merge_of_any_object() {
        let c = Consolidator::new();
        let mut doc = json!({"name": "Ada"});
        c.consolidate(&mut doc, "no structured data here, just {\"age\": 30} in prose");
        assert_eq!(doc["age"], 30);
        assert_eq!(doc["name"], "Ada");
    }
}
