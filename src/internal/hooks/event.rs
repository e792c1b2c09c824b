//! Hook events read from standard input.
//!
//! An [`Event`] is an open JSON object. After [`Event::from_slice`] returns, the
//! event has been normalized by [`super::source::normalize`] and always carries
//! a `hook_event_name` field, whichever tool emitted it.

use serde_json::{Map, Value};

use super::error::{HookcastError, Result};
use super::source::{self, HookSource};

/// Canonical discriminator field present on every normalized event.
pub const HOOK_EVENT_NAME: &str = "hook_event_name";

/// A normalized hook event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    data: Map<String, Value>,
    source: HookSource,
}

impl Event {
    /// Parse and normalize an event from raw bytes.
    ///
    /// Fails with [`HookcastError::ParseError`] when the input is blank, is not
    /// valid JSON, or is valid JSON but not an object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(HookcastError::ParseError("no input on stdin".to_string()));
        }

        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| HookcastError::ParseError(format!("invalid JSON: {e}")))?;

        match value {
            Value::Object(data) => Ok(Self::normalized(data)),
            other => Err(HookcastError::ParseError(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build an event from an already-parsed JSON object.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self::normalized(data)
    }

    fn normalized(mut data: Map<String, Value>) -> Self {
        let source = source::normalize(&mut data);
        Self { data, source }
    }

    /// The canonical event name.
    pub fn name(&self) -> &str {
        self.get_str(HOOK_EVENT_NAME).unwrap_or(source::UNKNOWN_EVENT)
    }

    /// The hook ecosystem that emitted this event.
    pub fn source(&self) -> HookSource {
        self.source
    }

    /// Gets a top-level field as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key)?.as_str()
    }

    /// Look up a field by exact key, falling back to a dotted path into nested
    /// objects (e.g. `tool_input.command`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The event fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.data
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claude_code_event() {
        let event =
            Event::from_slice(br#"{"hook_event_name": "Notification", "message": "hi"}"#).unwrap();
        assert_eq!(event.name(), "Notification");
        assert_eq!(event.get_str("message"), Some("hi"));
        assert_eq!(event.source(), HookSource::ClaudeCode);
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(matches!(
            Event::from_slice(b""),
            Err(HookcastError::ParseError(_))
        ));
        assert!(matches!(
            Event::from_slice(b"  \n\t"),
            Err(HookcastError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = Event::from_slice(br#"{"invalid": }"#).unwrap_err();
        assert!(matches!(err, HookcastError::ParseError(_)));
    }

    #[test]
    fn test_non_object_is_parse_error() {
        let err = Event::from_slice(b"[1, 2, 3]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to parse event: expected a JSON object, got an array"
        );
        assert!(Event::from_slice(b"\"Stop\"").is_err());
    }

    #[test]
    fn test_nested_lookup() {
        let event = Event::from_slice(
            br#"{"hook_event_name": "PreToolUse", "tool_input": {"command": "ls", "args": ["-l"]}}"#,
        )
        .unwrap();
        assert_eq!(
            event.lookup("tool_input.command"),
            Some(&Value::String("ls".to_string()))
        );
        assert_eq!(
            event.lookup("tool_input.args.0"),
            Some(&Value::String("-l".to_string()))
        );
        assert_eq!(event.lookup("tool_input.missing"), None);
    }

    #[test]
    fn test_exact_key_wins_over_path() {
        let event = Event::from_slice(br#"{"a.b": "flat", "a": {"b": "nested"}}"#).unwrap();
        assert_eq!(event.lookup("a.b"), Some(&Value::String("flat".to_string())));
    }
}
