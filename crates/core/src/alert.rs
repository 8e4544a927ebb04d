//! Alert candidate and notification attempt types.

use serde::{Deserialize, Serialize};

use crate::snapshot::SensorSnapshot;
use crate::types::{RuleKey, Timestamp};

/// Severity level attached to an alert rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// An alert proposed by the evaluator, prior to suppression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCandidate {
    /// Key of the rule that produced this candidate.
    pub rule_key: RuleKey,
    pub severity: Severity,
    /// Rendered subject line.
    pub subject: String,
    /// Rendered message body.
    pub body: String,
    /// The snapshot that triggered the rule.
    pub snapshot: SensorSnapshot,
    /// Taken from the snapshot capture time so evaluation stays deterministic.
    pub generated_at: Timestamp,
}

/// Which delivery path an attempt went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    /// Network transport (HTTP alert service, SMTP, ...).
    Primary,
    /// Degraded, no-network compose action.
    Fallback,
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// Delivered and acknowledged by the transport.
    Sent,
    /// Dispatched, but delivery cannot be verified (compose action, simulated send).
    Previewed,
    Failed,
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::Previewed => "previewed",
            DeliveryOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One delivery attempt for a candidate over one channel.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationAttempt {
    pub candidate: AlertCandidate,
    pub recipients: Vec<String>,
    pub channel: NotificationChannel,
    pub outcome: DeliveryOutcome,
    /// Human-readable transport detail (error text, preview URL, delivery counts).
    pub detail: Option<String>,
    pub attempted_at: Timestamp,
}
