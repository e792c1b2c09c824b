//! Default mode: read one event from stdin, resolve config, dispatch, and
//! answer the caller with a JSON line on stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::internal::handlers::HandlerRegistry;
use crate::internal::hooks::{
    DispatchPlan, DispatchReport, Event, HookResponse, Pipeline, Result, SearchContext,
    TemplateEngine,
};

const RESPONSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Use this config file instead of searching (also `HOOKCAST_CONFIG`)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Global dispatch deadline, overriding `settings.timeout_ms`
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Print the matched handlers with rendered config instead of dispatching
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: RunArgs, registry: Arc<HandlerRegistry>) -> Result<i32> {
    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;
    let event = Event::from_slice(&input)?;
    tracing::info!(event = event.name(), source = %event.source(), "received hook event");

    let working_dir = std::env::current_dir()?;
    let search = SearchContext::from_env(working_dir, args.config, event.source());
    let pipeline = Pipeline::new(registry, TemplateEngine::from_env())
        .with_timeout(args.timeout_ms.map(Duration::from_millis));

    if args.dry_run {
        let plan = pipeline.plan(&event, &search)?;
        print!("{}", render_plan(&plan));
        return Ok(0);
    }

    let report = pipeline.run(event.clone(), &search).await?;
    summarize(&report);
    let response = HookResponse::for_event(&event, &report);
    write_response(&response).await;
    Ok(report.exit_code())
}

/// Write the reply line to stdout. A reader that never drains stdout must not
/// hold the process past its deadline, so the write gives up after a while.
async fn write_response(response: &HookResponse) {
    let line = format!("{}\n", response.to_json());
    let mut stdout = tokio::io::stdout();
    let write = async {
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await
    };
    match tokio::time::timeout(RESPONSE_WRITE_TIMEOUT, write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("failed to write hook response: {e}"),
        Err(_) => tracing::warn!("stdout is not being read, dropping hook response"),
    }
}

/// One JSON line per matched handler.
fn render_plan(plan: &DispatchPlan) -> String {
    plan.handlers
        .iter()
        .map(|handler| {
            let line = json!({
                "name": handler.name,
                "type": handler.handler_type,
                "config": handler.config,
            });
            format!("{line}\n")
        })
        .collect()
}

fn summarize(report: &DispatchReport) {
    let failed = report.failures().count();
    if failed == 0 {
        tracing::info!(handlers = report.results.len(), "all handlers succeeded");
        return;
    }
    for result in report.failures() {
        if let Some(err) = result.error() {
            tracing::error!(handler = %result.name, "{err}");
        }
    }
    tracing::error!(
        failed,
        total = report.results.len(),
        "some handlers did not succeed"
    );
}
