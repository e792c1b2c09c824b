//! `{{placeholder}}` substitution in handler configuration.
//!
//! Every string inside a handler's `config` may reference:
//!
//! - `{{field}}` or `{{field.nested}}`: a value from the event
//! - `{{env.NAME}}`: an environment variable
//! - `{{secret.NAME}}`: a secret from the configured [`SecretStore`]
//!
//! Placeholders that cannot be resolved render as an empty string, so a
//! template shared across event types never fails a dispatch.

use std::collections::HashMap;
use std::path::PathBuf;

use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::event::Event;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_-]*(?:\.[A-Za-z0-9_-]+)*)\s*\}\}")
        .expect("placeholder regex is valid")
});

/// Prefix for secrets supplied through the environment.
pub const SECRET_ENV_PREFIX: &str = "HOOKCAST_SECRET_";

/// A read-only source of named string values.
pub trait ValueProvider: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl ValueProvider for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Reads process environment variables, optionally under a prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider {
    prefix: String,
    uppercase: bool,
}

impl EnvProvider {
    /// Looks up variables by their exact name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `{prefix}{KEY}`, with the key uppercased and non-alphanumerics
    /// replaced by `_`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uppercase: true,
        }
    }
}

impl ValueProvider for EnvProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        let key = if self.uppercase {
            key.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .collect()
        } else {
            key.to_string()
        };
        std::env::var(format!("{}{key}", self.prefix)).ok()
    }
}

/// A flat `{"name": "value"}` JSON file, read on first lookup.
#[derive(Debug)]
pub struct SecretFile {
    path: PathBuf,
    values: OnceCell<HashMap<String, String>>,
}

impl SecretFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: OnceCell::new(),
        }
    }

    fn values(&self) -> &HashMap<String, String> {
        self.values.get_or_init(|| {
            let Ok(content) = std::fs::read_to_string(&self.path) else {
                return HashMap::new();
            };
            serde_json::from_str::<HashMap<String, Value>>(&content)
                .map(|map| {
                    map.into_iter()
                        .map(|(k, v)| (k, stringify(&v)))
                        .collect()
                })
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse secrets file {}: {}", self.path.display(), e);
                    HashMap::new()
                })
        })
    }
}

impl ValueProvider for SecretFile {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }
}

/// Layered secret providers; the first provider that knows a key wins.
#[derive(Default)]
pub struct SecretStore {
    providers: Vec<Box<dyn ValueProvider>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `HOOKCAST_SECRET_*` environment variables, then
    /// `~/.config/hookcast/secrets.json`.
    pub fn from_env() -> Self {
        let mut store = Self::new().with_provider(EnvProvider::with_prefix(SECRET_ENV_PREFIX));
        if let Some(config_dir) = dirs::config_dir() {
            store = store.with_provider(SecretFile::new(
                config_dir.join("hookcast").join("secrets.json"),
            ));
        }
        store
    }

    pub fn with_provider(mut self, provider: impl ValueProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

impl ValueProvider for SecretStore {
    fn lookup(&self, key: &str) -> Option<String> {
        self.providers.iter().find_map(|p| p.lookup(key))
    }
}

/// Renders handler configuration against an event.
pub struct TemplateEngine {
    env: Box<dyn ValueProvider>,
    secrets: Box<dyn ValueProvider>,
}

impl TemplateEngine {
    pub fn new(env: impl ValueProvider + 'static, secrets: impl ValueProvider + 'static) -> Self {
        Self {
            env: Box::new(env),
            secrets: Box::new(secrets),
        }
    }

    /// Engine backed by the process environment and the default secret store.
    pub fn from_env() -> Self {
        Self::new(EnvProvider::new(), SecretStore::from_env())
    }

    /// Substitute placeholders in every string of `value`. Object keys and
    /// non-string leaves are left untouched.
    pub fn render(&self, value: &Value, event: &Event) -> Value {
        match value {
            Value::String(s) => Value::String(self.render_str(s, event)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.render(v, event)).collect())
            }
            Value::Object(map) => Value::Object(self.render_map(map, event)),
            other => other.clone(),
        }
    }

    pub fn render_map(&self, map: &Map<String, Value>, event: &Event) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.render(v, event)))
            .collect()
    }

    pub fn render_str(&self, template: &str, event: &Event) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| self.resolve(&caps[1], event))
            .into_owned()
    }

    /// Like [`render_str`](Self::render_str), but every resolved value passes
    /// through `escape` together with the literal template text between the
    /// previous placeholder and this one.
    pub fn render_str_with(
        &self,
        template: &str,
        event: &Event,
        mut escape: impl FnMut(&str, String) -> String,
    ) -> String {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let literal = &template[last..whole.start()];
            out.push_str(literal);
            out.push_str(&escape(literal, self.resolve(&caps[1], event)));
            last = whole.end();
        }
        out.push_str(&template[last..]);
        out
    }

    fn resolve(&self, path: &str, event: &Event) -> String {
        let resolved = match path.split_once('.') {
            Some(("env", name)) => self.env.lookup(name),
            Some(("secret", name)) => self.secrets.lookup(name),
            _ => event.lookup(path).map(stringify),
        };
        resolved.unwrap_or_else(|| {
            tracing::debug!(placeholder = path, "unresolved placeholder");
            String::new()
        })
    }
}

/// Text form of a JSON value inside a template.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
