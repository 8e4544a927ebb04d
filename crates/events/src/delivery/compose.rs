//! Fallback transport: pre-filled `mailto:` compose action.
//!
//! [`MailtoComposer`] needs no network. It builds a `mailto:` URL carrying
//! the recipients, subject and body. When an opener command is configured
//! (`xdg-open`, `open`, a desktop mail client), it is launched with the URL
//! so the operator's mail client pops up. Otherwise the URL itself is
//! surfaced in the attempt detail for the operator to act on.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::process::Command;

use super::{AlertMessage, FallbackReceipt, FallbackTransport, TransportError};

/// How long the opener may run before it is killed.
pub const DEFAULT_OPENER_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything except RFC 3986 unreserved characters.
const QUERY_ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Addresses additionally keep `@`.
const ADDRESS_ESCAPE_SET: &AsciiSet = &QUERY_ESCAPE_SET.remove(b'@');

/// Build `mailto:a,b?subject=..&body=..`.
pub fn mailto_url(recipients: &[String], subject: &str, body: &str) -> String {
    let to = recipients
        .iter()
        .map(|r| utf8_percent_encode(r, ADDRESS_ESCAPE_SET).to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "mailto:{to}?subject={}&body={}",
        utf8_percent_encode(subject, QUERY_ESCAPE_SET),
        utf8_percent_encode(body, QUERY_ESCAPE_SET),
    )
}

pub struct MailtoComposer {
    opener: Option<String>,
    timeout: Duration,
}

impl MailtoComposer {
    /// Surface the URL only.
    pub fn new() -> Self {
        Self {
            opener: None,
            timeout: DEFAULT_OPENER_TIMEOUT,
        }
    }

    /// Launch `opener <url>` on every compose.
    pub fn with_opener(opener: impl Into<String>) -> Self {
        Self {
            opener: Some(opener.into()),
            timeout: DEFAULT_OPENER_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn launch(&self, opener: &str, url: &str) -> Result<(), TransportError> {
        let mut child = Command::new(opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::NotConfigured(format!("cannot start {opener}: {e}")))?;

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(TransportError::Rejected(format!(
                "{opener} exited with {}",
                status.code().unwrap_or(-1)
            ))),
            Ok(Err(e)) => Err(TransportError::Unreachable(e.to_string())),
            // `child` is killed on drop.
            Err(_elapsed) => Err(TransportError::Unreachable(format!(
                "{opener} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

impl Default for MailtoComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FallbackTransport for MailtoComposer {
    fn name(&self) -> &'static str {
        "mailto"
    }

    async fn compose(&self, message: &AlertMessage) -> Result<FallbackReceipt, TransportError> {
        let url = mailto_url(&message.recipients, &message.subject, &message.body);

        match &self.opener {
            Some(opener) => {
                self.launch(opener, &url).await?;
                tracing::info!(rule_key = %message.rule_key, opener, "Opened compose window");
                Ok(FallbackReceipt {
                    detail: Some(format!("compose window opened with {opener}")),
                })
            }
            None => Ok(FallbackReceipt { detail: Some(url) }),
        }
    }
}
