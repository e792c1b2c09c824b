//! The full per-invocation pipeline: config → match → template → dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::config::{SearchContext, Settings};
use super::error::Result;
use super::event::Event;
use super::matcher::select_handlers;
use super::runner::{DispatchReport, HookRunner, PreparedHandler};
use super::template::TemplateEngine;
use crate::internal::handlers::HandlerRegistry;

/// What an invocation will do, computed before anything is dispatched.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    /// The configuration file in use.
    pub config_path: PathBuf,
    /// Pattern of the override that replaced the base handler list, if any.
    pub applied_override: Option<String>,
    pub settings: Settings,
    /// Matched handlers, in declaration order, with templated config.
    pub handlers: Vec<PreparedHandler>,
}

/// Ties together config resolution, matching, templating and dispatch.
pub struct Pipeline {
    registry: Arc<HandlerRegistry>,
    engine: TemplateEngine,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(registry: Arc<HandlerRegistry>, engine: TemplateEngine) -> Self {
        Self {
            registry,
            engine,
            timeout: None,
        }
    }

    /// Override the configured global deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve configuration and select handlers for `event`.
    pub fn plan(&self, event: &Event, search: &SearchContext) -> Result<DispatchPlan> {
        let resolved = search.resolve()?;
        tracing::debug!(
            config = %resolved.path.display(),
            event = event.name(),
            source = %event.source(),
            handlers = resolved.handlers.len(),
            "resolved configuration"
        );

        let handlers = select_handlers(&resolved.handlers, event)
            .into_iter()
            .map(|handler| PreparedHandler::prepare(handler, &self.registry, &self.engine, event))
            .collect();

        Ok(DispatchPlan {
            config_path: resolved.path,
            applied_override: resolved.applied_override,
            settings: resolved.settings,
            handlers,
        })
    }

    /// Plan and dispatch. Only configuration problems are returned as errors;
    /// handler failures are reported in the [`DispatchReport`].
    pub async fn run(&self, event: Event, search: &SearchContext) -> Result<DispatchReport> {
        let plan = self.plan(&event, search)?;
        if plan.handlers.is_empty() {
            tracing::debug!(event = event.name(), "no handlers matched");
            return Ok(DispatchReport::default());
        }

        let mut runner = HookRunner::with_settings(Arc::clone(&self.registry), &plan.settings);
        if let Some(timeout) = self.timeout {
            runner = runner.with_timeout(timeout);
        }
        Ok(runner.dispatch(Arc::new(event), plan.handlers).await)
    }
}
