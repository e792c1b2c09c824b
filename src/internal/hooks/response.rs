//! The JSON reply written to stdout once dispatch has finished.
//!
//! Hook callers read stdout as the hook's answer. hookcast only observes, so
//! it never blocks, denies or rewrites anything: Claude Code events get
//! `suppressOutput` (plus a `systemMessage` naming failed handlers), and
//! OpenCode-only or unrecognized events get `{}`.

use serde::Serialize;

use super::event::Event;
use super::runner::DispatchReport;

/// Canonical events that Claude Code itself emits and answers with JSON.
const CLAUDE_CODE_EVENTS: &[&str] = &[
    "PreToolUse",
    "PostToolUse",
    "PermissionRequest",
    "Notification",
    "UserPromptSubmit",
    "Stop",
    "SubagentStop",
    "PreCompact",
    "SessionStart",
    "SessionEnd",
];

/// Reply for one invocation. Serializes to `{}` when nothing needs saying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    /// Keep hookcast's stdout out of the transcript.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub suppress_output: bool,
    /// Shown to the user by the calling tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

impl HookResponse {
    /// Build the reply for `event` from the dispatch outcomes.
    pub fn for_event(event: &Event, report: &DispatchReport) -> Self {
        if !CLAUDE_CODE_EVENTS.iter().any(|name| *name == event.name()) {
            return Self::default();
        }

        let failed: Vec<&str> = report.failures().map(|r| r.name.as_str()).collect();
        let system_message = (!failed.is_empty()).then(|| {
            format!(
                "hookcast: {} of {} handlers failed ({})",
                failed.len(),
                report.results.len(),
                failed.join(", ")
            )
        });

        Self {
            suppress_output: true,
            system_message,
        }
    }

    /// Single-line JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_value(self)
            .map(|value| value.to_string())
            .unwrap_or_else(|_| "{}".to_string())
    }
}
