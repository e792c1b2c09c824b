//! Handler registry: maps a handler `type` to the adapter that delivers it.
//!
//! Every backend implements [`HandlerAdapter`]. The dispatcher only sees this
//! trait, so adding a backend means writing one adapter and registering it.

pub mod command;
pub mod print;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use command::CommandHandler;
pub use print::PrintHandler;
pub use webhook::WebhookHandler;

use crate::internal::hooks::error::{HookcastError, Result};
use crate::internal::hooks::event::Event;
use crate::internal::hooks::template::TemplateEngine;

/// Everything an adapter needs to deliver one notification.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Name of the handler being delivered.
    pub handler_name: String,
    /// The handler's configuration with placeholders already substituted.
    pub config: Map<String, Value>,
    /// The normalized event, shared read-only between handlers.
    pub event: Arc<Event>,
}

impl Delivery {
    /// A required string setting.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.optional_str(key).ok_or_else(|| {
            HookcastError::HandlerAdapterError(format!(
                "handler `{}` requires a string `{key}` setting",
                self.handler_name
            ))
        })
    }

    /// An optional string setting; non-string values are ignored.
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// An optional boolean setting with a default.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.config
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

/// The single capability every notification backend provides.
#[async_trait]
pub trait HandlerAdapter: Send + Sync {
    /// One-line description shown by `--list-handlers`.
    fn description(&self) -> &'static str;

    /// Substitute placeholders in this handler's settings. Adapters that hand
    /// settings to an interpreter override this to escape event values.
    fn render_config(
        &self,
        config: &Map<String, Value>,
        engine: &TemplateEngine,
        event: &Event,
    ) -> Map<String, Value> {
        engine.render_map(config, event)
    }

    /// Perform the side effect. Errors are reported for this handler only.
    async fn deliver(&self, delivery: Delivery) -> Result<()>;
}

/// Registry of handler adapters keyed by type name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    adapters: HashMap<String, Arc<dyn HandlerAdapter>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in adapter.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("command", Arc::new(CommandHandler));
        registry.register("print", Arc::new(PrintHandler));
        registry.register("webhook", Arc::new(WebhookHandler::new()));
        registry
    }

    /// Register an adapter under `name`.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn HandlerAdapter>) {
        let name = name.into();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            tracing::warn!("Overwriting adapter for handler type: {name}");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, adapter: Arc<dyn HandlerAdapter>) -> Self {
        self.register(name, adapter);
        self
    }

    /// Get an adapter by type name.
    pub fn adapter(&self, name: &str) -> Option<Arc<dyn HandlerAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Registered type names with their descriptions, sorted by name.
    pub fn describe(&self) -> Vec<(&str, &'static str)> {
        let mut entries: Vec<_> = self
            .adapters
            .iter()
            .map(|(name, adapter)| (name.as_str(), adapter.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct MockHandler;

    #[async_trait]
    impl HandlerAdapter for MockHandler {
        fn description(&self) -> &'static str {
            "mock"
        }

        async fn deliver(&self, delivery: Delivery) -> Result<()> {
            delivery.require_str("message").map(|_| ())
        }
    }

    fn delivery(config: Value) -> Delivery {
        let Value::Object(config) = config else {
            panic!("config must be an object");
        };
        Delivery {
            handler_name: "test".to_string(),
            config,
            event: Arc::new(Event::from_map(Map::new())),
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = HandlerRegistry::builtin();
        let names: Vec<&str> = registry.describe().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["command", "print", "webhook"]);
        assert!(registry.adapter("desktop").is_none());
    }

    #[tokio::test]
    async fn test_register_and_deliver() {
        let registry = HandlerRegistry::new().with("mock", Arc::new(MockHandler));
        assert_eq!(registry.describe(), vec![("mock", "mock")]);

        let adapter = registry.adapter("mock").unwrap();
        assert!(adapter.deliver(delivery(json!({"message": "hi"}))).await.is_ok());

        let err = adapter.deliver(delivery(json!({}))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Handler failed: handler `test` requires a string `message` setting"
        );
    }

    #[test]
    fn test_delivery_settings() {
        let d = delivery(json!({"url": "http://x", "stdin_event": false, "n": 1}));
        assert_eq!(d.optional_str("url"), Some("http://x"));
        assert_eq!(d.optional_str("n"), None);
        assert!(!d.flag("stdin_event", true));
        assert!(d.flag("missing", true));
    }
}
