//! Hook event dispatch.
//!
//! One invocation handles one event read from stdin:
//!
//! 1. [`event`] parses the JSON and [`source`] normalizes it so that Claude
//!    Code and OpenCode events share the same `hook_event_name` values.
//! 2. [`config`] finds the single configuration file in effect and applies the
//!    last matching path override.
//! 3. [`matcher`] selects handlers whose `match_rules` hold.
//! 4. [`template`] fills `{{placeholders}}` in each handler's config.
//! 5. [`runner`] delivers every handler concurrently under a global deadline.
//! 6. [`response`] builds the JSON reply the calling tool reads from stdout.

pub mod config;
pub mod error;
pub mod event;
pub mod matcher;
pub mod pipeline;
pub mod response;
pub mod runner;
pub mod source;
pub mod template;

pub use config::{HandlerConfig, HookConfig, Override, ResolvedConfig, SearchContext, Settings};
pub use error::{HookcastError, Result};
pub use event::Event;
pub use matcher::{MatchRule, select_handlers};
pub use pipeline::{DispatchPlan, Pipeline};
pub use response::HookResponse;
pub use runner::{DispatchOutcome, DispatchReport, DispatchResult, HookRunner, PreparedHandler};
pub use source::HookSource;
pub use template::TemplateEngine;
