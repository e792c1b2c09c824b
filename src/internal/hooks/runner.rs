//! Hook runner: delivers matched handlers concurrently and collects results.
//!
//! Each handler runs as its own tokio task. A failing, panicking or stuck
//! handler never delays the others, and one global deadline bounds the whole
//! fan-out: whatever is still running when it passes is recorded as timed
//! out and aborted.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::config::{HandlerConfig, Settings};
use super::error::HookcastError;
use super::event::Event;
use super::template::TemplateEngine;
use crate::internal::handlers::{Delivery, HandlerAdapter, HandlerRegistry};

/// A matched handler with its configuration already templated.
#[derive(Debug, Clone)]
pub struct PreparedHandler {
    pub name: String,
    pub handler_type: String,
    pub config: Map<String, Value>,
    pub timeout: Option<Duration>,
}

impl PreparedHandler {
    /// Render `handler`'s configuration against `event`, letting the adapter
    /// for its type escape substituted values.
    pub fn prepare(
        handler: &HandlerConfig,
        registry: &HandlerRegistry,
        engine: &TemplateEngine,
        event: &Event,
    ) -> Self {
        let config = match registry.adapter(&handler.handler_type) {
            Some(adapter) => adapter.render_config(&handler.config, engine, event),
            None => engine.render_map(&handler.config, event),
        };
        Self {
            name: handler.name.clone(),
            handler_type: handler.handler_type.clone(),
            config,
            timeout: handler.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// How a single handler ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failed(String),
    TimedOut(Duration),
}

/// Outcome of one handler, kept only for reporting.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub name: String,
    pub handler_type: String,
    pub outcome: DispatchOutcome,
    pub elapsed: Duration,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        self.outcome == DispatchOutcome::Success
    }

    /// The failure as an error value, if the handler did not succeed.
    pub fn error(&self) -> Option<HookcastError> {
        match &self.outcome {
            DispatchOutcome::Success => None,
            DispatchOutcome::Failed(reason) => {
                Some(HookcastError::HandlerAdapterError(reason.clone()))
            }
            DispatchOutcome::TimedOut(after) => Some(HookcastError::TimeoutError(after.as_millis())),
        }
    }
}

/// Results of one dispatch, in handler declaration order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub results: Vec<DispatchResult>,
}

impl DispatchReport {
    /// True when every handler succeeded (vacuously true for no handlers).
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(DispatchResult::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Process exit status for this report.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() { 0 } else { 1 }
    }

    pub fn get(&self, name: &str) -> Option<&DispatchResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Executes prepared handlers through the registry.
pub struct HookRunner {
    registry: Arc<HandlerRegistry>,
    timeout: Duration,
    max_concurrency: usize,
}

impl HookRunner {
    /// Create a runner with default settings.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        let settings = Settings::default();
        Self {
            registry,
            timeout: Duration::from_millis(settings.timeout_ms),
            max_concurrency: settings.max_concurrency,
        }
    }

    /// Create a runner from configuration settings.
    pub fn with_settings(registry: Arc<HandlerRegistry>, settings: &Settings) -> Self {
        Self::new(registry)
            .with_timeout(Duration::from_millis(settings.timeout_ms))
            .with_max_concurrency(settings.max_concurrency)
    }

    /// Set the global deadline for one dispatch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limit how many handlers run at once (at least one).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deliver every handler concurrently and wait for all of them, or for the
    /// global deadline, whichever comes first.
    pub async fn dispatch(&self, event: Arc<Event>, handlers: Vec<PreparedHandler>) -> DispatchReport {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let permits = self.max_concurrency.min(handlers.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut slots: Vec<Option<DispatchResult>> = handlers.iter().map(|_| None).collect();
        let labels: Vec<(String, String)> = handlers
            .iter()
            .map(|h| (h.name.clone(), h.handler_type.clone()))
            .collect();

        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(labels.len());
        for (index, handler) in handlers.into_iter().enumerate() {
            let adapter = self.registry.adapter(&handler.handler_type);
            let semaphore = Arc::clone(&semaphore);
            let event = Arc::clone(&event);
            let task = tasks.spawn(async move {
                let task_started = Instant::now();
                let outcome = match adapter {
                    None => DispatchOutcome::Failed(format!(
                        "unknown handler type `{}`",
                        handler.handler_type
                    )),
                    Some(adapter) => {
                        // The semaphore lives as long as the dispatch and is never closed.
                        let _permit = semaphore.acquire_owned().await;
                        run_handler(adapter, handler, event).await
                    }
                };
                (index, outcome, task_started.elapsed())
            });
            task_index.insert(task.id(), index);
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, outcome, elapsed)))) => {
                    let (name, handler_type) = labels[index].clone();
                    log_outcome(&name, &outcome, elapsed);
                    slots[index] = Some(DispatchResult {
                        name,
                        handler_type,
                        outcome,
                        elapsed,
                    });
                }
                Ok(Some(Err(e))) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        tracing::warn!("handler task ended abnormally: {e}");
                        continue;
                    };
                    let (name, handler_type) = labels[index].clone();
                    let outcome = if e.is_panic() {
                        DispatchOutcome::Failed(format!(
                            "handler panicked: {}",
                            panic_message(&*e.into_panic())
                        ))
                    } else {
                        DispatchOutcome::Failed("handler task was cancelled".to_string())
                    };
                    let elapsed = started.elapsed();
                    log_outcome(&name, &outcome, elapsed);
                    slots[index] = Some(DispatchResult {
                        name,
                        handler_type,
                        outcome,
                        elapsed,
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        outstanding = tasks.len(),
                        "dispatch deadline of {}ms reached, abandoning remaining handlers",
                        self.timeout.as_millis()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let results = slots
            .into_iter()
            .zip(labels)
            .map(|(slot, (name, handler_type))| {
                slot.unwrap_or_else(|| {
                    let outcome = DispatchOutcome::TimedOut(self.timeout);
                    log_outcome(&name, &outcome, started.elapsed());
                    DispatchResult {
                        name,
                        handler_type,
                        outcome,
                        elapsed: started.elapsed(),
                    }
                })
            })
            .collect();

        DispatchReport { results }
    }
}

async fn run_handler(
    adapter: Arc<dyn HandlerAdapter>,
    handler: PreparedHandler,
    event: Arc<Event>,
) -> DispatchOutcome {
    let delivery = Delivery {
        handler_name: handler.name,
        config: handler.config,
        event,
    };
    let call = AssertUnwindSafe(adapter.deliver(delivery)).catch_unwind();

    let result = match handler.timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => return DispatchOutcome::TimedOut(limit),
        },
        None => call.await,
    };

    match result {
        Ok(Ok(())) => DispatchOutcome::Success,
        Ok(Err(e)) => DispatchOutcome::Failed(e.to_string()),
        Err(panic) => DispatchOutcome::Failed(format!("handler panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

fn log_outcome(name: &str, outcome: &DispatchOutcome, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match outcome {
        DispatchOutcome::Success => tracing::info!(handler = name, elapsed_ms, "handler succeeded"),
        DispatchOutcome::Failed(reason) => {
            tracing::warn!(handler = name, elapsed_ms, "handler failed: {reason}")
        }
        DispatchOutcome::TimedOut(after) => tracing::warn!(
            handler = name,
            elapsed_ms,
            "handler timed out after {}ms",
            after.as_millis()
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::internal::hooks::error::Result;

    struct OkHandler;
    struct FailHandler;
    struct HangHandler;
    struct PanicHandler;

    #[async_trait]
    impl HandlerAdapter for OkHandler {
        fn description(&self) -> &'static str {
            "ok"
        }
        async fn deliver(&self, _delivery: Delivery) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl HandlerAdapter for FailHandler {
        fn description(&self) -> &'static str {
            "fail"
        }
        async fn deliver(&self, _delivery: Delivery) -> Result<()> {
            Err(HookcastError::HandlerAdapterError("HTTP 503".to_string()))
        }
    }

    #[async_trait]
    impl HandlerAdapter for HangHandler {
        fn description(&self) -> &'static str {
            "never returns"
        }
        async fn deliver(&self, _delivery: Delivery) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[async_trait]
    impl HandlerAdapter for PanicHandler {
        fn description(&self) -> &'static str {
            "panics"
        }
        async fn deliver(&self, _delivery: Delivery) -> Result<()> {
            panic!("adapter exploded");
        }
    }

    /// Panics while building its future, outside the adapter's own future.
    struct EagerPanicHandler;

    impl HandlerAdapter for EagerPanicHandler {
        fn description(&self) -> &'static str {
            "panics before returning a future"
        }

        fn deliver<'life0, 'async_trait>(
            &'life0 self,
            _delivery: Delivery,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'async_trait>>
        where
            'life0: 'async_trait,
            Self: 'async_trait,
        {
            panic!("no future for you")
        }
    }

    /// Records the templated config and tracks peak concurrency.
    #[derive(Default)]
    struct RecordingHandler {
        configs: Mutex<Vec<Map<String, Value>>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl HandlerAdapter for RecordingHandler {
        fn description(&self) -> &'static str {
            "records"
        }
        async fn deliver(&self, delivery: Delivery) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.configs.lock().unwrap().push(delivery.config);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new()
            .with("ok", Arc::new(OkHandler))
            .with("fail", Arc::new(FailHandler))
            .with("hang", Arc::new(HangHandler))
            .with("panic", Arc::new(PanicHandler))
            .with("eager-panic", Arc::new(EagerPanicHandler))
    }

    fn prepared(name: &str, handler_type: &str) -> PreparedHandler {
        PreparedHandler {
            name: name.to_string(),
            handler_type: handler_type.to_string(),
            config: Map::new(),
            timeout: None,
        }
    }

    fn event() -> Arc<Event> {
        let mut data = Map::new();
        data.insert("hook_event_name".to_string(), json!("Stop"));
        Arc::new(Event::from_map(data))
    }

    #[tokio::test]
    async fn test_all_success() {
        let runner = HookRunner::new(Arc::new(registry()));
        let report = runner
            .dispatch(event(), vec![prepared("a", "ok"), prepared("b", "ok")])
            .await;
        assert!(report.all_succeeded());
        assert_eq!(report.exit_code(), 0);
        let names: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_no_handlers_is_success() {
        let runner = HookRunner::new(Arc::new(registry()));
        let report = runner.dispatch(event(), vec![]).await;
        assert!(report.results.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let runner = HookRunner::new(Arc::new(registry()));
        let report = runner
            .dispatch(
                event(),
                vec![prepared("a", "ok"), prepared("b", "fail"), prepared("c", "panic")],
            )
            .await;
        assert_eq!(report.exit_code(), 1);
        assert!(report.get("a").unwrap().is_success());
        assert_eq!(
            report.get("b").unwrap().outcome,
            DispatchOutcome::Failed("Handler failed: HTTP 503".to_string())
        );
        assert_eq!(
            report.get("c").unwrap().outcome,
            DispatchOutcome::Failed("handler panicked: adapter exploded".to_string())
        );
        assert_eq!(report.failures().count(), 2);
    }

    #[tokio::test]
    async fn test_task_panic_is_reported_as_failure() {
        let runner = HookRunner::new(Arc::new(registry())).with_timeout(Duration::from_secs(5));
        let report = runner
            .dispatch(event(), vec![prepared("boom", "eager-panic"), prepared("a", "ok")])
            .await;
        assert_eq!(
            report.get("boom").unwrap().outcome,
            DispatchOutcome::Failed("handler panicked: no future for you".to_string())
        );
        assert!(report.get("a").unwrap().is_success());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_unknown_type_fails_only_that_handler() {
        let runner = HookRunner::new(Arc::new(registry()));
        let report = runner
            .dispatch(event(), vec![prepared("x", "carrier-pigeon"), prepared("y", "ok")])
            .await;
        assert!(matches!(
            report.get("x").unwrap().error(),
            Some(HookcastError::HandlerAdapterError(reason)) if reason.contains("carrier-pigeon")
        ));
        assert!(report.get("y").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_global_deadline_bounds_stuck_handler() {
        let runner =
            HookRunner::new(Arc::new(registry())).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let report = runner
            .dispatch(
                event(),
                vec![
                    prepared("a", "ok"),
                    prepared("stuck", "hang"),
                    prepared("b", "fail"),
                    prepared("c", "ok"),
                ],
            )
            .await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(report.results.len(), 4);
        assert!(report.get("a").unwrap().is_success());
        assert!(report.get("c").unwrap().is_success());
        assert!(matches!(report.get("b").unwrap().outcome, DispatchOutcome::Failed(_)));
        assert_eq!(
            report.get("stuck").unwrap().outcome,
            DispatchOutcome::TimedOut(Duration::from_millis(200))
        );
        assert!(matches!(
            report.get("stuck").unwrap().error(),
            Some(HookcastError::TimeoutError(200))
        ));
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_per_handler_timeout() {
        let runner = HookRunner::new(Arc::new(registry()));
        let mut stuck = prepared("stuck", "hang");
        stuck.timeout = Some(Duration::from_millis(50));
        let started = std::time::Instant::now();
        let report = runner.dispatch(event(), vec![stuck, prepared("a", "ok")]).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            report.get("stuck").unwrap().outcome,
            DispatchOutcome::TimedOut(Duration::from_millis(50))
        );
        assert!(report.get("a").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let recorder = Arc::new(RecordingHandler::default());
        let registry = HandlerRegistry::new().with("rec", recorder.clone());
        let runner = HookRunner::new(Arc::new(registry)).with_max_concurrency(2);
        let handlers = (0..6).map(|i| prepared(&format!("h{i}"), "rec")).collect();
        let report = runner.dispatch(event(), handlers).await;
        assert!(report.all_succeeded());
        assert_eq!(recorder.configs.lock().unwrap().len(), 6);
        assert!(recorder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_prepare_templates_config() {
        let handler: HandlerConfig = serde_json::from_value(json!({
            "name": "notify",
            "type": "rec",
            "match_rules": {"hook_event_name": "Notification"},
            "config": {"body": "msg: {{message}}", "priority": 5},
            "timeout_ms": 1500
        }))
        .unwrap();
        let mut data = Map::new();
        data.insert("hook_event_name".to_string(), json!("Notification"));
        data.insert("message".to_string(), json!("hi"));
        let event = Event::from_map(data);

        let engine = TemplateEngine::new(
            HashMap::<String, String>::new(),
            HashMap::<String, String>::new(),
        );
        let recorder = Arc::new(RecordingHandler::default());
        let registry = Arc::new(HandlerRegistry::new().with("rec", recorder.clone()));
        let prepared = PreparedHandler::prepare(&handler, &registry, &engine, &event);
        assert_eq!(prepared.config["body"], json!("msg: hi"));
        assert_eq!(prepared.config["priority"], json!(5));
        assert_eq!(prepared.timeout, Some(Duration::from_millis(1500)));

        let runner = HookRunner::new(registry);
        let report = runner.dispatch(Arc::new(event), vec![prepared]).await;
        assert!(report.all_succeeded());
        assert_eq!(recorder.configs.lock().unwrap()[0]["body"], json!("msg: hi"));
    }
}
