//! Match rules: decide which handlers fire for an event.
//!
//! Rules are written in JSON and compiled once, at config load, into a
//! [`MatchRule`] tree:
//!
//! - `null` (or no `match_rules` key) matches everything.
//! - `{"field": "value", ...}` matches when every field is present and equal.
//!   With `"match_type": "regex"` the values are regular expressions that must
//!   match the whole field.
//! - `{"any": [rule, ...]}` matches when at least one sub-rule matches.
//! - `{"all": [rule, ...]}` matches when every sub-rule matches.
//!
//! Sibling keys are combined with AND. Anything else compiles to
//! [`MatchRule::Invalid`], which never matches, so one broken handler
//! definition cannot stop the others from dispatching.

use std::borrow::Cow;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::config::HandlerConfig;
use super::event::Event;

const MATCH_TYPE: &str = "match_type";
const ANY: &str = "any";
const ALL: &str = "all";

/// A compiled match rule.
#[derive(Debug, Clone, Default)]
pub enum MatchRule {
    /// Matches every event.
    #[default]
    Always,
    /// Compares one event field.
    Field { field: String, matcher: FieldMatch },
    /// Short-circuiting OR.
    Any(Vec<MatchRule>),
    /// Short-circuiting AND.
    All(Vec<MatchRule>),
    /// A rule that could not be understood. Never matches.
    Invalid(String),
}

/// How a single field is compared.
#[derive(Debug, Clone)]
pub enum FieldMatch {
    Literal(String),
    /// Anchored so that it must match the whole value.
    Regex(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchType {
    Exact,
    Regex,
}

impl MatchRule {
    /// Compile a JSON rule.
    pub fn compile(value: &Value) -> Self {
        let rule = match value {
            Value::Null => Self::Always,
            Value::Object(map) => Self::compile_object(map),
            other => Self::Invalid(format!("rule must be an object or null, got {other}")),
        };
        if let Self::Invalid(reason) = &rule {
            tracing::warn!(%reason, "invalid match rule, it will never match");
        }
        rule
    }

    fn compile_object(map: &Map<String, Value>) -> Self {
        let match_type = match map.get(MATCH_TYPE) {
            None => MatchType::Exact,
            Some(Value::String(s)) if s == "exact" || s == "literal" => MatchType::Exact,
            Some(Value::String(s)) if s == "regex" => MatchType::Regex,
            Some(other) => return Self::Invalid(format!("unsupported match_type {other}")),
        };

        let mut rules: Vec<MatchRule> = map
            .iter()
            .filter(|(key, _)| key.as_str() != MATCH_TYPE)
            .map(|(key, value)| match key.as_str() {
                ANY => Self::compile_list(value).map_or_else(Self::Invalid, Self::Any),
                ALL => Self::compile_list(value).map_or_else(Self::Invalid, Self::All),
                field => Self::compile_field(field, value, match_type),
            })
            .collect();

        if rules.len() == 1 {
            rules.remove(0)
        } else {
            Self::All(rules)
        }
    }

    fn compile_list(value: &Value) -> Result<Vec<MatchRule>, String> {
        match value {
            Value::Array(items) => Ok(items.iter().map(Self::compile).collect()),
            other => Err(format!("`any`/`all` must be a list of rules, got {other}")),
        }
    }

    fn compile_field(field: &str, value: &Value, match_type: MatchType) -> Self {
        let Some(expected) = scalar_text(value) else {
            return Self::Invalid(format!("field `{field}` must be a string, number or boolean"));
        };
        let matcher = match match_type {
            MatchType::Exact => FieldMatch::Literal(expected.into_owned()),
            MatchType::Regex => match Regex::new(&format!("^(?:{expected})$")) {
                Ok(re) => FieldMatch::Regex(re),
                Err(e) => return Self::Invalid(format!("field `{field}`: {e}")),
            },
        };
        Self::Field {
            field: field.to_string(),
            matcher,
        }
    }

    /// Evaluate this rule against an event. Never fails.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Always => true,
            Self::Field { field, matcher } => event
                .lookup(field)
                .and_then(scalar_text)
                .is_some_and(|actual| matcher.is_match(&actual)),
            Self::Any(rules) => rules.iter().any(|rule| rule.matches(event)),
            Self::All(rules) => rules.iter().all(|rule| rule.matches(event)),
            Self::Invalid(_) => false,
        }
    }
}

impl FieldMatch {
    fn is_match(&self, actual: &str) -> bool {
        match self {
            Self::Literal(expected) => expected == actual,
            Self::Regex(re) => re.is_match(actual),
        }
    }
}

impl<'de> Deserialize<'de> for MatchRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::compile(&value))
    }
}

/// Text form used when comparing scalars: strings verbatim, numbers and
/// booleans as JSON.
fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

/// Select the enabled handlers whose rules match `event`, in declaration order.
pub fn select_handlers<'a>(handlers: &'a [HandlerConfig], event: &Event) -> Vec<&'a HandlerConfig> {
    handlers
        .iter()
        .filter(|handler| {
            if !handler.enabled {
                tracing::debug!(handler = %handler.name, "handler disabled");
                return false;
            }
            let matched = handler.match_rules.matches(event);
            tracing::debug!(handler = %handler.name, matched, "evaluated match rules");
            matched
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(value: Value) -> Event {
        match value {
            Value::Object(map) => Event::from_map(map),
            _ => panic!("test event must be an object"),
        }
    }

    fn rule(value: Value) -> MatchRule {
        MatchRule::compile(&value)
    }

    fn handler(name: &str, rules: Value) -> HandlerConfig {
        serde_json::from_value(json!({
            "name": name,
            "type": "print",
            "match_rules": rules,
            "config": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_null_matches_everything() {
        let r = rule(Value::Null);
        assert!(r.matches(&event(json!({}))));
        assert!(r.matches(&event(json!({"hook_event_name": "Stop"}))));
    }

    #[test]
    fn test_literal_field() {
        let r = rule(json!({"hook_event_name": "Notification"}));
        assert!(r.matches(&event(json!({"hook_event_name": "Notification"}))));
        assert!(!r.matches(&event(json!({"hook_event_name": "Stop"}))));
    }

    #[test]
    fn test_missing_field_is_false() {
        let r = rule(json!({"tool_name": "Bash"}));
        assert!(!r.matches(&event(json!({"hook_event_name": "PreToolUse"}))));
    }

    #[test]
    fn test_sibling_fields_are_and() {
        let r = rule(json!({"hook_event_name": "PreToolUse", "tool_name": "Bash"}));
        assert!(r.matches(&event(
            json!({"hook_event_name": "PreToolUse", "tool_name": "Bash"})
        )));
        assert!(!r.matches(&event(
            json!({"hook_event_name": "PreToolUse", "tool_name": "Edit"})
        )));
    }

    #[test]
    fn test_regex_is_full_match() {
        let r = rule(json!({"match_type": "regex", "tool_name": "Edit|Write"}));
        assert!(r.matches(&event(json!({"tool_name": "Write"}))));
        assert!(!r.matches(&event(json!({"tool_name": "MultiEdit"}))));
    }

    #[test]
    fn test_nested_field_path() {
        let r = rule(json!({"match_type": "regex", "tool_input.command": "git .*"}));
        assert!(r.matches(&event(json!({"tool_input": {"command": "git push"}}))));
        assert!(!r.matches(&event(json!({"tool_input": {"command": "rm -rf /"}}))));
    }

    #[test]
    fn test_non_string_scalars() {
        let r = rule(json!({"stop_hook_active": true, "attempt": 2}));
        assert!(r.matches(&event(json!({"stop_hook_active": true, "attempt": 2}))));
        assert!(!r.matches(&event(json!({"stop_hook_active": "false", "attempt": 2}))));
    }

    #[test]
    fn test_any_short_circuits_over_malformed_branch() {
        let r = rule(json!({"any": [
            {"hook_event_name": "Stop"},
            {"match_type": "regex", "tool_name": "(unclosed"}
        ]}));
        assert!(matches!(&r, MatchRule::Any(branches) if matches!(branches[1], MatchRule::Invalid(_))));
        assert!(r.matches(&event(json!({"hook_event_name": "Stop"}))));
        assert!(!r.matches(&event(json!({"hook_event_name": "Notification"}))));
    }

    #[test]
    fn test_any_combined_with_sibling_field() {
        let r = rule(json!({
            "hook_event_name": "PreToolUse",
            "any": [{"tool_name": "Bash"}, {"tool_name": "Edit"}]
        }));
        assert!(r.matches(&event(
            json!({"hook_event_name": "PreToolUse", "tool_name": "Edit"})
        )));
        assert!(!r.matches(&event(
            json!({"hook_event_name": "PostToolUse", "tool_name": "Edit"})
        )));
    }

    #[test]
    fn test_explicit_all() {
        let r = rule(json!({"all": [{"a": "1"}, {"b": "2"}]}));
        assert!(r.matches(&event(json!({"a": "1", "b": "2"}))));
        assert!(!r.matches(&event(json!({"a": "1"}))));
    }

    #[test]
    fn test_malformed_shapes_never_match() {
        let always = event(json!({"hook_event_name": "Stop"}));
        for bad in [
            json!(["hook_event_name", "Stop"]),
            json!("Stop"),
            json!({"any": {"hook_event_name": "Stop"}}),
            json!({"hook_event_name": {"eq": "Stop"}}),
            json!({"match_type": "glob", "hook_event_name": "Stop"}),
        ] {
            let r = rule(bad.clone());
            assert!(!r.matches(&always), "{bad} should not match");
        }
    }

    #[test]
    fn test_select_handlers_preserves_order() {
        let handlers = vec![
            handler("first", json!({"hook_event_name": "Stop"})),
            handler("second", json!({"hook_event_name": "Notification"})),
            handler("third", Value::Null),
            handler("broken", json!([1, 2])),
        ];
        let selected = select_handlers(&handlers, &event(json!({"hook_event_name": "Stop"})));
        let names: Vec<&str> = selected.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["first", "third"]);
    }

    #[test]
    fn test_disabled_handlers_skipped() {
        let mut h = handler("off", Value::Null);
        h.enabled = false;
        let handlers = [h];
        assert!(select_handlers(&handlers, &event(json!({}))).is_empty());
    }
}
