//! `webhook` handler: send the notification as an HTTP request.
//!
//! ```json
//! {
//!   "type": "webhook",
//!   "config": {
//!     "url": "https://hooks.slack.com/services/{{secret.slack_path}}",
//!     "headers": {"X-Source": "hookcast"},
//!     "body": {"text": "{{hook_event_name}}: {{message}}"}
//!   }
//! }
//! ```
//!
//! A string `body` is sent as text, any other JSON `body` as JSON, and a
//! missing `body` sends the event itself. Non-2xx responses are failures.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::Value;

use super::{Delivery, HandlerAdapter};
use crate::internal::hooks::error::{HookcastError, Result};
use crate::internal::hooks::template::stringify;

const USER_AGENT: &str = concat!("hookcast/", env!("CARGO_PKG_VERSION"));

/// Posts to `config.url`. Settings: `url` (required), `method` (default
/// `POST`), `headers`, `body`.
#[derive(Default)]
pub struct WebhookHandler {
    client: OnceCell<Client>,
}

impl WebhookHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| {
            Client::builder().user_agent(USER_AGENT).build().map_err(|e| {
                HookcastError::HandlerAdapterError(format!("failed to build HTTP client: {e}"))
            })
        })
    }
}

fn adapter_error(message: String) -> HookcastError {
    HookcastError::HandlerAdapterError(message)
}

#[async_trait]
impl HandlerAdapter for WebhookHandler {
    fn description(&self) -> &'static str {
        "Send an HTTP request (JSON or text body) to a URL"
    }

    async fn deliver(&self, delivery: Delivery) -> Result<()> {
        let url = delivery.require_str("url")?;
        let method = delivery.optional_str("method").unwrap_or("POST");
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| adapter_error(format!("invalid HTTP method `{method}`")))?;

        let mut request = self.client()?.request(method, url);

        let mut has_content_type = false;
        if let Some(headers) = delivery.config.get("headers") {
            let Value::Object(headers) = headers else {
                return Err(adapter_error("`headers` must be an object".to_string()));
            };
            for (name, value) in headers {
                has_content_type |= name.eq_ignore_ascii_case(CONTENT_TYPE.as_str());
                request = request.header(name.as_str(), stringify(value));
            }
        }

        request = match delivery.config.get("body") {
            Some(Value::String(text)) => {
                if !has_content_type {
                    request = request.header(CONTENT_TYPE, "text/plain; charset=utf-8");
                }
                request.body(text.clone())
            }
            Some(body) => request.json(body),
            None => request.json(delivery.event.fields()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| adapter_error(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(handler = %delivery.handler_name, status = status.as_u16(), "webhook delivered");
            Ok(())
        } else {
            Err(adapter_error(format!("webhook returned HTTP {}", status.as_u16())))
        }
    }
}
