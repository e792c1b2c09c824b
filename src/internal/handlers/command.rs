//! `command` handler: run a shell command with the event on stdin.
//!
//! ```json
//! {"type": "command", "config": {"command": "notify-send Claude {{message}}"}}
//! ```
//!
//! Placeholders in `command` are escaped for the quoting context they appear
//! in: a bare placeholder becomes one quoted shell word, and one inside `'...'`
//! or `"..."` stays inside those quotes. Event text is never parsed as shell.
//!
//! The child is killed if the dispatcher abandons it at the deadline.

use std::borrow::Cow;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Delivery, HandlerAdapter};
use crate::internal::hooks::error::{HookcastError, Result};
use crate::internal::hooks::event::Event;
use crate::internal::hooks::template::TemplateEngine;

const COMMAND: &str = "command";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Quoting {
    #[default]
    Bare,
    Single,
    Double,
}

/// Follows POSIX `sh` quoting through the literal parts of a command template.
#[derive(Debug, Default)]
struct ShellQuoter {
    quoting: Quoting,
    escaped: bool,
}

impl ShellQuoter {
    fn feed(&mut self, literal: &str) {
        for c in literal.chars() {
            if self.escaped {
                self.escaped = false;
                continue;
            }
            self.quoting = match (self.quoting, c) {
                (Quoting::Bare | Quoting::Double, '\\') => {
                    self.escaped = true;
                    self.quoting
                }
                (Quoting::Bare, '\'') => Quoting::Single,
                (Quoting::Bare, '"') => Quoting::Double,
                (Quoting::Single, '\'') | (Quoting::Double, '"') => Quoting::Bare,
                (quoting, _) => quoting,
            };
        }
    }

    /// Escape `value` so that it is inert at the current position.
    fn quote(&mut self, value: &str) -> String {
        let value: String = value.chars().filter(|&c| c != '\0').collect();
        // A dangling backslash would swallow our first character; give it one.
        let prefix = if std::mem::take(&mut self.escaped) { "\\" } else { "" };
        let quoted = match self.quoting {
            Quoting::Bare => shlex::try_quote(&value)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| single_quoted(&value)),
            Quoting::Single => value.replace('\'', r"'\''"),
            Quoting::Double => value
                .chars()
                .fold(String::with_capacity(value.len()), |mut out, c| {
                    if matches!(c, '\\' | '"' | '$' | '`') {
                        out.push('\\');
                    }
                    out.push(c);
                    out
                }),
        };
        format!("{prefix}{quoted}")
    }
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render a command template with every substituted value shell-escaped.
fn render_command(template: &str, engine: &TemplateEngine, event: &Event) -> String {
    let mut quoter = ShellQuoter::default();
    engine.render_str_with(template, event, |literal, value| {
        quoter.feed(literal);
        quoter.quote(&value)
    })
}

/// Runs `config.command` through `sh -c`.
///
/// Settings: `command` (required), `stdin_event` (default `true`) and `cwd`.
pub struct CommandHandler;

#[async_trait]
impl HandlerAdapter for CommandHandler {
    fn description(&self) -> &'static str {
        "Run a shell command; the event JSON is written to its stdin"
    }

    fn render_config(
        &self,
        config: &Map<String, Value>,
        engine: &TemplateEngine,
        event: &Event,
    ) -> Map<String, Value> {
        let mut rendered = engine.render_map(config, event);
        if let Some(Value::String(template)) = config.get(COMMAND) {
            rendered.insert(
                COMMAND.to_string(),
                Value::String(render_command(template, engine, event)),
            );
        }
        rendered
    }

    async fn deliver(&self, delivery: Delivery) -> Result<()> {
        let command = delivery.require_str(COMMAND)?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env("HOOKCAST_EVENT", delivery.event.name())
            .env("HOOKCAST_HANDLER", &delivery.handler_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = delivery.optional_str("cwd") {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| HookcastError::HandlerAdapterError(format!("failed to run command: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            if delivery.flag("stdin_event", true) {
                let input = serde_json::to_vec(delivery.event.fields()).map_err(|e| {
                    HookcastError::HandlerAdapterError(format!("failed to serialize event: {e}"))
                })?;
                // A command that never reads stdin closes the pipe early.
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!("command closed stdin early: {e}");
                }
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(handler = %delivery.handler_name, "command stdout: {}", stdout.trim());
        }

        if output.status.success() {
            Ok(())
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(HookcastError::HandlerAdapterError(format!(
                "command exited with {code}: {}",
                stderr.trim()
            )))
        }
    }
}
