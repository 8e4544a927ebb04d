//! Primary transport: remote HTTP alert-sending service.
//!
//! [`HttpAlertService`] POSTs `{recipients, subject, body, metadata}` to
//! `{base_url}/api/alerts/send` and interprets the JSON reply:
//!
//! | Reply                                          | Result                    |
//! |------------------------------------------------|---------------------------|
//! | connect error / timeout                        | `Unreachable`             |
//! | non-2xx status                                 | `Rejected` (status + body)|
//! | 2xx, body not JSON                             | `Unreachable`             |
//! | `ok` or `success` false                        | `Rejected` (`error` text) |
//! | `development_mode`/`previewUrl`                | unverified receipt        |
//! | any other 2xx JSON                             | verified receipt          |

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{AlertMessage, PrimaryReceipt, PrimaryTransport, TransportError};

/// HTTP request timeout for a single send.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Path of the send endpoint relative to the service base URL.
const SEND_PATH: &str = "/api/alerts/send";

#[derive(Debug, Deserialize)]
struct SendReply {
    ok: Option<bool>,
    success: Option<bool>,
    error: Option<String>,
    message: Option<String>,
    #[serde(default)]
    development_mode: bool,
    #[serde(rename = "previewUrl")]
    preview_url: Option<String>,
    successful: Option<u32>,
    failed: Option<u32>,
}

impl SendReply {
    /// Only an explicit `false` is a refusal; a 2xx reply without either
    /// flag counts as accepted.
    fn accepted(&self) -> bool {
        self.ok != Some(false) && self.success != Some(false)
    }
}

/// Sends alerts through the remote alert service.
#[derive(Debug)]
pub struct HttpAlertService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAlertService {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(TransportError::NotConfigured(
                "alert service URL is empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::NotConfigured(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{base}{SEND_PATH}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PrimaryTransport for HttpAlertService {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, message: &AlertMessage) -> Result<PrimaryReceipt, TransportError> {
        let payload = serde_json::json!({
            "recipients": message.recipients,
            "subject": message.subject,
            "body": message.body,
            "metadata": message.metadata,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    TransportError::NotConfigured(e.to_string())
                } else {
                    TransportError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Rejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let reply: SendReply = serde_json::from_str(&text).map_err(|e| {
            TransportError::Unreachable(format!("malformed alert service reply: {e}"))
        })?;

        if !reply.accepted() {
            let reason = reply
                .error
                .or(reply.message)
                .unwrap_or_else(|| "alert service reported failure".to_string());
            return Err(TransportError::Rejected(reason));
        }

        let counts = match (reply.successful, reply.failed) {
            (Some(ok), Some(failed)) => Some(format!("{ok}/{} delivered", ok + failed)),
            _ => None,
        };

        if reply.development_mode || reply.preview_url.is_some() {
            tracing::info!(
                rule_key = %message.rule_key,
                preview_url = reply.preview_url.as_deref(),
                "Alert service accepted message in preview mode"
            );
            return Ok(PrimaryReceipt::unverified(reply.preview_url.or(counts)));
        }

        tracing::info!(
            rule_key = %message.rule_key,
            recipients = message.recipients.len(),
            "Alert service delivered message"
        );
        Ok(PrimaryReceipt::verified(counts))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
