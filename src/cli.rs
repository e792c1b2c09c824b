//! CLI entry for hookcast: parses flags, sets up diagnostics on stderr, and
//! either lists handler types or dispatches the event read from stdin.
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use crate::command;
use crate::internal::handlers::HandlerRegistry;
use crate::internal::hooks::error::{HookcastError, Result};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "HOOKCAST_LOG";

// The Cli struct represents the root of the command line interface.
#[derive(Parser, Debug)]
#[command(
    name = "hookcast",
    about = "Dispatch a coding-agent hook event from stdin to notification handlers",
    version
)]
struct Cli {
    #[command(flatten)]
    run: command::run::RunArgs,

    #[arg(long, help = "List the registered handler types and exit")]
    list_handlers: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Increase diagnostic output (-v, -vv)")]
    verbose: u8,
}

/// How long runtime shutdown waits for blocking work (stdio writes to a reader
/// that stopped reading) before leaving it behind.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Parses the command line and runs hookcast, returning the process exit code.
/// - `args`: parse from command line if it's `None`, otherwise parse from the given args
pub fn parse(args: Option<&[&str]>) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(parse_async(args));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// `async` version of the [parse] function
pub async fn parse_async(args: Option<&[&str]>) -> Result<i32> {
    let parsed = match args {
        Some(args) => Cli::try_parse_from(args),
        None => Cli::try_parse(),
    };
    let args = match parsed {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(0);
        }
        Err(e) => return Err(HookcastError::InvalidArgument(e.to_string())),
    };
    init_tracing(args.verbose);

    let registry = Arc::new(HandlerRegistry::builtin());
    if args.list_handlers {
        command::list::execute(&registry);
        return Ok(0);
    }
    command::run::execute(args.run, registry).await
}

/// Install the stderr subscriber. `HOOKCAST_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when parse is called repeatedly in-process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// this test is to verify that the CLI can be built without panicking
/// according [clap dock](https://docs.rs/clap/latest/clap/_derive/_tutorial/chapter_4/index.html)
#[test]
fn verify_cli() {
    use clap::CommandFactory;

    Cli::command().debug_assert()
}

#[test]
fn help_is_not_an_error() {
    let code = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(parse_async(Some(&["hookcast", "--version"])))
        .unwrap();
    assert_eq!(code, 0);
}

#[test]
fn invalid_flag_is_reported() {
    let err = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(parse_async(Some(&["hookcast", "--no-such-flag"])))
        .unwrap_err();
    assert!(matches!(err, HookcastError::InvalidArgument(_)));
}
