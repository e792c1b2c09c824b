//! Hook configuration: discovery, loading and path overrides.
//!
//! Exactly one configuration file is used per invocation. Candidates are
//! searched in this order and the first one that exists and parses wins:
//!
//! 1. `{project}/.claude/hookcast.json` or `{project}/.opencode/hookcast.json`
//!    (depending on which tool emitted the event)
//! 2. `{project}/.hookcast/config.json`
//! 3. `~/.claude/hookcast.json` or `~/.config/opencode/hookcast.json`
//! 4. `~/.config/hookcast/config.json`
//!
//! `{project}` comes from `CLAUDE_PROJECT_DIR` / `OPENCODE_PROJECT_DIR` and
//! falls back to the working directory. An explicit path (`--config` or
//! `HOOKCAST_CONFIG`) bypasses the search entirely.
//!
//! A file may declare `overrides`: the last one whose `path_pattern` matches the
//! working directory replaces the whole handler list. Overrides never merge and
//! never reach into another file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{HookcastError, Result};
use super::matcher::MatchRule;
use super::source::HookSource;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HOOKCAST_CONFIG";
/// Project root exported by Claude Code to hook commands.
pub const CLAUDE_PROJECT_DIR_ENV: &str = "CLAUDE_PROJECT_DIR";
/// Project root for OpenCode plugin invocations.
pub const OPENCODE_PROJECT_DIR_ENV: &str = "OPENCODE_PROJECT_DIR";

const APP_DIR: &str = "hookcast";
const ECOSYSTEM_FILE: &str = "hookcast.json";
const SHARED_FILE: &str = "config.json";

/// A single handler definition.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// Unique name within its handler list.
    pub name: String,
    /// Registered handler type (e.g. `webhook`).
    #[serde(rename = "type")]
    pub handler_type: String,
    /// When this handler fires. Absent or `null` matches every event.
    #[serde(default)]
    pub match_rules: MatchRule,
    /// Backend-specific settings; string values may contain `{{placeholders}}`.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Per-handler deadline in milliseconds, bounded by the global timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Whether this handler is enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A handler list that replaces the base list when the working directory
/// matches `path_pattern`.
#[derive(Debug, Clone, Deserialize)]
pub struct Override {
    pub path_pattern: String,
    pub handlers: Vec<HandlerConfig>,
}

impl Override {
    /// Check whether this override applies to `dir`.
    ///
    /// `*` stays within one path segment, `**` spans segments, and a leading
    /// `~/` expands to the home directory. Invalid patterns never match.
    pub fn matches(&self, dir: &Path, home: Option<&Path>) -> bool {
        let pattern = match (self.path_pattern.strip_prefix("~/"), home) {
            (Some(rest), Some(home)) => format!("{}/{rest}", home.display()),
            _ => self.path_pattern.clone(),
        };
        match Pattern::new(&pattern) {
            Ok(glob) => glob.matches_path_with(dir, path_match_options()),
            Err(e) => {
                tracing::warn!(pattern = %self.path_pattern, error = %e, "invalid override pattern, it will never match");
                false
            }
        }
    }
}

fn path_match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Invocation-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Global dispatch deadline in milliseconds. Defaults to 30_000.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Upper bound on handlers running at once. Defaults to 8.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_timeout() -> u64 {
    30_000
}

fn default_max_concurrency() -> usize {
    8
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    pub handlers: Vec<HandlerConfig>,
    #[serde(default)]
    pub overrides: Vec<Override>,
    #[serde(default)]
    pub settings: Settings,
}

impl HookConfig {
    /// Parse and validate a configuration document read from `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let config: HookConfig =
            serde_json::from_str(content).map_err(|e| HookcastError::config_parse(path, e))?;
        ensure_unique_names(&config.handlers, path)?;
        for ov in &config.overrides {
            ensure_unique_names(&ov.handlers, path)?;
        }
        Ok(config)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| HookcastError::config_parse(path, e))?;
        Self::parse(&content, path)
    }

    /// The last override matching `dir`, if any.
    pub fn active_override(&self, dir: &Path, home: Option<&Path>) -> Option<&Override> {
        self.overrides.iter().rfind(|ov| ov.matches(dir, home))
    }
}

fn ensure_unique_names(handlers: &[HandlerConfig], path: &Path) -> Result<()> {
    let mut seen = HashSet::new();
    for handler in handlers {
        if !seen.insert(handler.name.as_str()) {
            return Err(HookcastError::config_parse(
                path,
                format!("duplicate handler name `{}`", handler.name),
            ));
        }
    }
    Ok(())
}

/// The handler list in effect for this invocation.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The file the handlers came from.
    pub path: PathBuf,
    pub handlers: Vec<HandlerConfig>,
    pub settings: Settings,
    /// Pattern of the override that replaced the base list, if one did.
    pub applied_override: Option<String>,
}

/// Inputs to config discovery.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub working_dir: PathBuf,
    pub explicit: Option<PathBuf>,
    pub source: HookSource,
    pub project_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

impl SearchContext {
    /// A context with no explicit path and no global directories; the project
    /// root is the working directory.
    pub fn new(working_dir: impl Into<PathBuf>, source: HookSource) -> Self {
        let working_dir = working_dir.into();
        Self {
            project_dir: working_dir.clone(),
            working_dir,
            explicit: None,
            source,
            home_dir: None,
            config_dir: None,
        }
    }

    /// Build a context from the process environment.
    pub fn from_env(
        working_dir: impl Into<PathBuf>,
        explicit: Option<PathBuf>,
        source: HookSource,
    ) -> Self {
        let explicit = explicit.or_else(|| env_path(CONFIG_ENV));
        let project_hint = match source {
            HookSource::ClaudeCode => env_path(CLAUDE_PROJECT_DIR_ENV),
            HookSource::OpenCode => env_path(OPENCODE_PROJECT_DIR_ENV),
            HookSource::Unknown => {
                env_path(CLAUDE_PROJECT_DIR_ENV).or_else(|| env_path(OPENCODE_PROJECT_DIR_ENV))
            }
        };

        let mut ctx = Self::new(working_dir, source);
        if let Some(project_dir) = project_hint {
            ctx.project_dir = project_dir;
        }
        ctx.explicit = explicit;
        ctx.home_dir = dirs::home_dir();
        ctx.config_dir = dirs::config_dir();
        ctx
    }

    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn with_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(dir.into());
        self
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Candidate paths, in search order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(4);

        match self.source {
            HookSource::ClaudeCode => {
                paths.push(self.project_dir.join(".claude").join(ECOSYSTEM_FILE))
            }
            HookSource::OpenCode => {
                paths.push(self.project_dir.join(".opencode").join(ECOSYSTEM_FILE))
            }
            HookSource::Unknown => {}
        }

        paths.push(self.project_dir.join(format!(".{APP_DIR}")).join(SHARED_FILE));

        match self.source {
            HookSource::ClaudeCode => {
                if let Some(home) = &self.home_dir {
                    paths.push(home.join(".claude").join(ECOSYSTEM_FILE));
                }
            }
            HookSource::OpenCode => {
                if let Some(config_dir) = &self.config_dir {
                    paths.push(config_dir.join("opencode").join(ECOSYSTEM_FILE));
                }
            }
            HookSource::Unknown => {}
        }

        if let Some(config_dir) = &self.config_dir {
            paths.push(config_dir.join(APP_DIR).join(SHARED_FILE));
        }

        paths
    }

    /// Locate and load the configuration file.
    pub fn load(&self) -> Result<(PathBuf, HookConfig)> {
        if let Some(path) = &self.explicit {
            if !path.exists() {
                return Err(HookcastError::ConfigNotFound(path.display().to_string()));
            }
            let config = HookConfig::load(path)?;
            tracing::debug!(path = %path.display(), "loaded explicit config");
            return Ok((path.clone(), config));
        }

        let candidates = self.candidates();
        let mut last_error = None;
        for path in &candidates {
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "config candidate not present");
                continue;
            }
            match HookConfig::load(path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "loaded config");
                    return Ok((path.clone(), config));
                }
                Err(e) => {
                    tracing::warn!("Skipping config {}: {}", path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            let searched: Vec<String> = candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            HookcastError::ConfigNotFound(format!("searched {}", searched.join(", ")))
        }))
    }

    /// Load the configuration and apply the matching override, if any.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let (path, config) = self.load()?;
        Ok(resolve_handlers(path, config, &self.working_dir, self.home_dir.as_deref()))
    }
}

/// Apply overrides from `config` for `working_dir`.
pub fn resolve_handlers(
    path: PathBuf,
    config: HookConfig,
    working_dir: &Path,
    home: Option<&Path>,
) -> ResolvedConfig {
    let applied = config
        .active_override(working_dir, home)
        .map(|ov| (ov.path_pattern.clone(), ov.handlers.clone()));

    let (handlers, applied_override) = match applied {
        Some((pattern, handlers)) => {
            tracing::debug!(%pattern, dir = %working_dir.display(), "override replaces handler list");
            (handlers, Some(pattern))
        }
        None => (config.handlers, None),
    };

    ResolvedConfig {
        path,
        handlers,
        settings: config.settings,
        applied_override,
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
