//! Delivery transports used by the notification dispatcher.
//!
//! A [`PrimaryTransport`] is a network call to a message-sending service
//! (HTTP alert service, SMTP). A [`FallbackTransport`] is a locally
//! actionable compose operation that needs no network. Email, SMS and
//! chat transports are interchangeable behind the same traits.

pub mod compose;
pub mod email;
pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use damwatch_core::alert::{AlertCandidate, Severity};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error returned by a transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Missing or invalid configuration (no endpoint, bad SMTP host, ...).
    #[error("Transport not configured: {0}")]
    NotConfigured(String),

    /// The service could not be reached (connect error, timeout, garbled reply).
    #[error("Transport unreachable: {0}")]
    Unreachable(String),

    /// The service answered and refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether the dispatcher should try the fallback channel.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            TransportError::NotConfigured(_) | TransportError::Unreachable(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Message / receipts
// ---------------------------------------------------------------------------

/// Transport-neutral alert payload.
#[derive(Debug, Clone, Serialize)]
pub struct AlertMessage {
    pub rule_key: String,
    pub severity: Severity,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Snapshot readings, rule key and severity, forwarded verbatim.
    pub metadata: serde_json::Value,
}

impl AlertMessage {
    pub fn from_candidate(candidate: &AlertCandidate, recipients: &[String]) -> Self {
        Self {
            rule_key: candidate.rule_key.clone(),
            severity: candidate.severity,
            recipients: recipients.to_vec(),
            subject: candidate.subject.clone(),
            body: candidate.body.clone(),
            metadata: serde_json::json!({
                "rule_key": candidate.rule_key,
                "severity": candidate.severity,
                "generated_at": candidate.generated_at,
                "snapshot": candidate.snapshot,
            }),
        }
    }
}

/// Successful primary delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryReceipt {
    /// `false` when the service accepted the message but delivery cannot be
    /// verified (development mode, preview URL).
    pub verified: bool,
    pub detail: Option<String>,
}

impl PrimaryReceipt {
    pub fn verified(detail: Option<String>) -> Self {
        Self {
            verified: true,
            detail,
        }
    }

    pub fn unverified(detail: Option<String>) -> Self {
        Self {
            verified: false,
            detail,
        }
    }
}

/// Successful fallback compose action. Always unverifiable.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackReceipt {
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PrimaryTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &AlertMessage) -> Result<PrimaryReceipt, TransportError>;
}

#[async_trait]
pub trait FallbackTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn compose(&self, message: &AlertMessage) -> Result<FallbackReceipt, TransportError>;
}
