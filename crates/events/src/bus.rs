//! In-process operator notice bus backed by a `tokio::sync::broadcast` channel.
//!
//! Every admission, suppression, dispatch outcome, registry change and
//! channel connectivity change is published here as an [`OperatorNotice`].
//! The bus is shared via `Arc<NoticeBus>`; the API forwards notices to
//! connected operator WebSockets.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use damwatch_core::types::Timestamp;

// ---------------------------------------------------------------------------
// NoticeLevel / NoticeKind
// ---------------------------------------------------------------------------

/// Display level of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Admitted,
    Suppressed,
    Sent,
    Previewed,
    Failed,
    Rejected,
    EvaluationError,
    Connected,
    Connecting,
    Disconnected,
    RemoteAlertSent,
    RemoteAlertError,
    AuthoritiesRefreshed,
    AuthoritiesStale,
    AuthoritiesSaved,
}

impl NoticeKind {
    /// Level used when the publisher does not override it.
    pub fn default_level(self) -> NoticeLevel {
        match self {
            NoticeKind::Sent
            | NoticeKind::Connected
            | NoticeKind::RemoteAlertSent
            | NoticeKind::AuthoritiesSaved => NoticeLevel::Success,
            NoticeKind::Admitted
            | NoticeKind::Suppressed
            | NoticeKind::Connecting
            | NoticeKind::AuthoritiesRefreshed => NoticeLevel::Info,
            NoticeKind::Previewed
            | NoticeKind::EvaluationError
            | NoticeKind::Disconnected
            | NoticeKind::AuthoritiesStale => NoticeLevel::Warning,
            NoticeKind::Failed | NoticeKind::Rejected | NoticeKind::RemoteAlertError => {
                NoticeLevel::Error
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OperatorNotice
// ---------------------------------------------------------------------------

/// A discrete, human-readable notification for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorNotice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub kind: NoticeKind,
    pub message: String,
    /// Alert rule the notice refers to, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_key: Option<String>,
    pub timestamp: Timestamp,
}

impl OperatorNotice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level: kind.default_level(),
            kind,
            message: message.into(),
            rule_key: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_rule_key(mut self, rule_key: impl Into<String>) -> Self {
        self.rule_key = Some(rule_key.into());
        self
    }

    pub fn with_level(mut self, level: NoticeLevel) -> Self {
        self.level = level;
        self
    }
}

// ---------------------------------------------------------------------------
// NoticeBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for [`OperatorNotice`]s.
///
/// When the buffer is full the oldest notices are dropped and slow
/// receivers observe `RecvError::Lagged`.
pub struct NoticeBus {
    sender: broadcast::Sender<OperatorNotice>,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notice to all current subscribers. The notice is also
    /// logged, so it is never lost when nobody is subscribed.
    pub fn publish(&self, notice: OperatorNotice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!(
                kind = ?notice.kind,
                rule_key = notice.rule_key.as_deref(),
                "{}",
                notice.message
            ),
            NoticeLevel::Warning => tracing::warn!(
                kind = ?notice.kind,
                rule_key = notice.rule_key.as_deref(),
                "{}",
                notice.message
            ),
            NoticeLevel::Success | NoticeLevel::Info => tracing::info!(
                kind = ?notice.kind,
                rule_key = notice.rule_key.as_deref(),
                "{}",
                notice.message
            ),
        }
        // Zero receivers is not an error.
        let _ = self.sender.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperatorNotice> {
        self.sender.subscribe()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
