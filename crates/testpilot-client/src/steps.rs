//! Step text normalization.
//!
//! The generator stores steps either as plain text or as JSON (an array of
//! step strings, or an object with a `steps` array). Normalization turns the
//! JSON forms into readable text and leaves everything else untouched, so
//! applying it to already-normalized text is a no-op.

use serde_json::Value;

/// Normalizes step text for display.
///
/// - JSON array: `"1. first\n2. second"`.
/// - JSON object with a `steps` array: the steps joined by newlines.
/// - Anything else, including JSON that does not parse: returned unchanged.
pub fn normalize_steps(steps: &str) -> String {
    let trimmed = steps.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let looks_like_json = (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'));
    if !looks_like_json {
        return steps.to_string();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}", i + 1, step_text(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(Value::Object(map)) => match map.get("steps").and_then(Value::as_array) {
            Some(items) => items.iter().map(step_text).collect::<Vec<_>>().join("\n"),
            None => steps.to_string(),
        },
        _ => steps.to_string(),
    }
}

fn step_text(item: &Value) -> String {
    match item {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
