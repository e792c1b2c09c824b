//! Hook source detection and event-name normalization.
//!
//! Claude Code events carry `hook_event_name` directly. OpenCode events name
//! themselves with dotted `category.phase` strings in a `type`, `event` or
//! `hook` field; those are mapped to the Claude Code names so that one set of
//! match rules works for both.
//!
//! | OpenCode event         | Canonical name      |
//! |------------------------|---------------------|
//! | `tool.execute.before`  | `PreToolUse`        |
//! | `tool.execute.after`   | `PostToolUse`       |
//! | `session.idle`         | `Stop`              |
//! | `session.completed`    | `Stop`              |
//! | `session.created`      | `SessionStart`      |
//! | `session.deleted`      | `SessionEnd`        |
//! | `session.compacted`    | `PreCompact`        |
//! | `session.compacting`   | `PreCompact`        |
//! | `file.edited`          | `FileEdited`        |
//! | `session.error`        | `SessionError`      |
//! | `permission.updated`   | `PermissionRequest` |

use std::fmt;

use serde_json::{Map, Value};

use super::event::HOOK_EVENT_NAME;

/// Canonical name for events with no identifying field.
pub const UNKNOWN_EVENT: &str = "Unknown";
/// Field recording which ecosystem emitted the event.
pub const HOOK_SOURCE: &str = "hook_source";
/// Set to `true` when a dotted event name had no canonical mapping.
pub const UNCLASSIFIED: &str = "hook_event_unclassified";

/// Fields inspected, in order, for an OpenCode event name.
const OPENCODE_NAME_FIELDS: &[&str] = &["type", "event", "hook"];

/// The hook ecosystem an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSource {
    ClaudeCode,
    OpenCode,
    Unknown,
}

impl HookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::OpenCode => "opencode",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an OpenCode event name to the canonical hook name.
pub fn map_opencode_event(name: &str) -> Option<&'static str> {
    match name {
        "tool.execute.before" => Some("PreToolUse"),
        "tool.execute.after" => Some("PostToolUse"),
        "session.idle" | "session.completed" => Some("Stop"),
        "session.created" => Some("SessionStart"),
        "session.deleted" => Some("SessionEnd"),
        "session.compacted" | "session.compacting" => Some("PreCompact"),
        "file.edited" => Some("FileEdited"),
        "session.error" => Some("SessionError"),
        "permission.updated" => Some("PermissionRequest"),
        _ => None,
    }
}

/// Finds the dotted OpenCode event name in `data`, if any.
///
/// A name with a known mapping is preferred over an unmapped one seen in an
/// earlier field.
pub fn detect_opencode_event(data: &Map<String, Value>) -> Option<&str> {
    let mut unmapped = None;
    for name in OPENCODE_NAME_FIELDS
        .iter()
        .filter_map(|field| dotted_name(data.get(*field)?))
    {
        if map_opencode_event(name).is_some() {
            return Some(name);
        }
        if unmapped.is_none() {
            unmapped = Some(name);
        }
    }
    unmapped
}

fn dotted_name(value: &Value) -> Option<&str> {
    let name = match value {
        Value::String(s) => s.as_str(),
        // OpenCode plugins forward `{ event: { type, properties } }`.
        Value::Object(inner) => inner.get("type")?.as_str()?,
        _ => return None,
    };
    let mut parts = name.split('.');
    let dotted = parts.next().is_some_and(|p| !p.is_empty())
        && parts.next().is_some_and(|p| !p.is_empty());
    dotted.then_some(name)
}

/// Rewrites `data` into canonical shape and returns the detected source.
///
/// Never fails: events that cannot be classified get `hook_event_name` set to
/// [`UNKNOWN_EVENT`], and unmapped OpenCode names are kept verbatim and tagged
/// with [`UNCLASSIFIED`].
pub fn normalize(data: &mut Map<String, Value>) -> HookSource {
    let source = if matches!(data.get(HOOK_EVENT_NAME), Some(Value::String(_))) {
        HookSource::ClaudeCode
    } else if let Some(name) = detect_opencode_event(data).map(str::to_string) {
        match map_opencode_event(&name) {
            Some(mapped) => {
                data.insert(HOOK_EVENT_NAME.to_string(), Value::String(mapped.to_string()));
            }
            None => {
                tracing::debug!(event = %name, "unclassified OpenCode event");
                data.insert(HOOK_EVENT_NAME.to_string(), Value::String(name));
                data.insert(UNCLASSIFIED.to_string(), Value::Bool(true));
            }
        }
        HookSource::OpenCode
    } else {
        data.insert(
            HOOK_EVENT_NAME.to_string(),
            Value::String(UNKNOWN_EVENT.to_string()),
        );
        HookSource::Unknown
    };

    data.insert(
        HOOK_SOURCE.to_string(),
        Value::String(source.as_str().to_string()),
    );
    source
}
