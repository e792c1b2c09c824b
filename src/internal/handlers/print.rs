//! `print` handler: write one line to stderr or stdout.
//!
//! Stdout carries hookcast's JSON reply to the calling tool, so lines go to
//! stderr unless `"stream": "stdout"` is set explicitly.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{Delivery, HandlerAdapter};
use crate::internal::hooks::error::{HookcastError, Result};

/// Writes `config.message` (default: the event name) followed by a newline.
///
/// `stream` selects `"stderr"` (default) or `"stdout"`.
pub struct PrintHandler;

#[async_trait]
impl HandlerAdapter for PrintHandler {
    fn description(&self) -> &'static str {
        "Print a message to stderr (or stdout)"
    }

    async fn deliver(&self, delivery: Delivery) -> Result<()> {
        let message = delivery
            .optional_str("message")
            .unwrap_or_else(|| delivery.event.name());
        let line = format!("{message}\n");

        match delivery.optional_str("stream").unwrap_or("stderr") {
            "stdout" => {
                let mut out = tokio::io::stdout();
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;
            }
            "stderr" => {
                let mut err = tokio::io::stderr();
                err.write_all(line.as_bytes()).await?;
                err.flush().await?;
            }
            other => {
                return Err(HookcastError::HandlerAdapterError(format!(
                    "unknown stream `{other}`, expected `stdout` or `stderr`"
                )));
            }
        }
        Ok(())
    }
}
