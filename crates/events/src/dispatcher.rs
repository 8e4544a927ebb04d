//! Notification dispatcher: admitted candidate + recipients -> delivery attempts.
//!
//! Channel order is fixed. The primary transport is tried first; the
//! fallback compose action runs if and only if the primary is missing,
//! misconfigured or unreachable. A primary that answers and refuses the
//! message is a total failure without fallback, and a primary success never
//! reaches the fallback.
//!
//! [`Dispatcher::spawn`] checks preconditions synchronously and then runs the
//! delivery on a tracked task so the tick loop never waits for I/O.
//! [`Dispatcher::shutdown`] gives in-flight tasks a grace period and then
//! abandons the rest, each reporting a `failed` outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use damwatch_core::alert::{
    AlertCandidate, DeliveryOutcome, NotificationAttempt, NotificationChannel,
};

use crate::bus::{NoticeBus, NoticeKind, OperatorNotice};
use crate::delivery::{AlertMessage, FallbackTransport, PrimaryTransport};

/// Detail recorded on attempts cut short by shutdown.
pub const ABANDONED_DETAIL: &str = "abandoned at shutdown";

// ---------------------------------------------------------------------------
// Error / report types
// ---------------------------------------------------------------------------

/// Precondition failures, reported before any transport is touched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Recipient list is empty")]
    NoRecipients,

    #[error("Malformed alert candidate: {0}")]
    MalformedCandidate(String),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

/// Completion signal of one dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub rule_key: String,
    /// Outcome of the last attempt.
    pub outcome: DeliveryOutcome,
    /// Attempts in channel order.
    pub attempts: Vec<NotificationAttempt>,
}

impl DispatchReport {
    fn from_attempts(rule_key: &str, attempts: Vec<NotificationAttempt>) -> Self {
        let outcome = attempts
            .last()
            .map(|a| a.outcome)
            .unwrap_or(DeliveryOutcome::Failed);
        Self {
            rule_key: rule_key.to_string(),
            outcome,
            attempts,
        }
    }
}

/// Handle to a spawned dispatch.
#[derive(Debug)]
pub struct DispatchHandle {
    rule_key: String,
    join: JoinHandle<DispatchReport>,
}

impl DispatchHandle {
    pub fn rule_key(&self) -> &str {
        &self.rule_key
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the dispatch to complete.
    pub async fn wait(self) -> DispatchReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(rule_key = %self.rule_key, error = %e, "Dispatch task panicked");
                DispatchReport {
                    rule_key: self.rule_key,
                    outcome: DeliveryOutcome::Failed,
                    attempts: Vec::new(),
                }
            }
        }
    }
}

/// Result of [`Dispatcher::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Dispatches still running when the grace period ran out.
    pub abandoned: usize,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Channels {
    primary: Option<Arc<dyn PrimaryTransport>>,
    fallback: Arc<dyn FallbackTransport>,
    notices: Arc<NoticeBus>,
}

pub struct Dispatcher {
    channels: Arc<Channels>,
    tracker: TaskTracker,
    abandon: CancellationToken,
}

impl Dispatcher {
    /// `primary` is `None` when no network transport is configured; every
    /// dispatch then goes straight to the fallback.
    pub fn new(
        primary: Option<Arc<dyn PrimaryTransport>>,
        fallback: Arc<dyn FallbackTransport>,
        notices: Arc<NoticeBus>,
    ) -> Self {
        Self {
            channels: Arc::new(Channels {
                primary,
                fallback,
                notices,
            }),
            tracker: TaskTracker::new(),
            abandon: CancellationToken::new(),
        }
    }

    /// Dispatches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Deliver inline and return every attempt.
    pub async fn dispatch(
        &self,
        candidate: &AlertCandidate,
        recipients: &[String],
    ) -> Result<Vec<NotificationAttempt>, DispatchError> {
        self.validate(candidate, recipients)?;
        Ok(deliver(&self.channels, candidate, recipients).await)
    }

    /// Check preconditions, then deliver on a tracked background task.
    pub fn spawn(
        &self,
        candidate: AlertCandidate,
        recipients: Vec<String>,
    ) -> Result<DispatchHandle, DispatchError> {
        self.validate(&candidate, &recipients)?;

        let channels = Arc::clone(&self.channels);
        let abandon = self.abandon.clone();
        let rule_key = candidate.rule_key.clone();

        let join = self.tracker.spawn(async move {
            tokio::select! {
                attempts = deliver(&channels, &candidate, &recipients) => {
                    DispatchReport::from_attempts(&candidate.rule_key, attempts)
                }
                _ = abandon.cancelled() => {
                    channels.notices.publish(
                        OperatorNotice::new(
                            NoticeKind::Failed,
                            format!("Alert abandoned at shutdown: {}", candidate.subject),
                        )
                        .with_rule_key(&candidate.rule_key),
                    );
                    let attempt = attempt(
                        &candidate,
                        &recipients,
                        NotificationChannel::Primary,
                        DeliveryOutcome::Failed,
                        Some(ABANDONED_DETAIL.to_string()),
                    );
                    DispatchReport::from_attempts(&candidate.rule_key, vec![attempt])
                }
            }
        });

        Ok(DispatchHandle { rule_key, join })
    }

    /// Stop accepting work, wait up to `grace` for in-flight dispatches,
    /// then abandon the remainder.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownSummary {
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            tracing::info!("All dispatches completed before shutdown");
            return ShutdownSummary { abandoned: 0 };
        }

        let abandoned = self.tracker.len();
        tracing::warn!(abandoned, "Shutdown grace period elapsed, abandoning dispatches");
        self.abandon.cancel();
        self.tracker.wait().await;
        ShutdownSummary { abandoned }
    }

    /// Precondition check run by [`spawn`](Self::spawn) and
    /// [`dispatch`](Self::dispatch). A failure is published as a `rejected`
    /// notice.
    pub fn validate(
        &self,
        candidate: &AlertCandidate,
        recipients: &[String],
    ) -> Result<(), DispatchError> {
        let result = if self.tracker.is_closed() {
            Err(DispatchError::ShuttingDown)
        } else if recipients.iter().all(|r| r.trim().is_empty()) {
            Err(DispatchError::NoRecipients)
        } else if candidate.rule_key.trim().is_empty() {
            Err(DispatchError::MalformedCandidate("empty rule key".into()))
        } else if candidate.subject.trim().is_empty() {
            Err(DispatchError::MalformedCandidate("empty subject".into()))
        } else if candidate.body.trim().is_empty() {
            Err(DispatchError::MalformedCandidate("empty body".into()))
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            self.channels.notices.publish(
                OperatorNotice::new(
                    NoticeKind::Rejected,
                    format!("Alert not dispatched: {e}: {}", candidate.subject),
                )
                .with_rule_key(&candidate.rule_key),
            );
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

fn attempt(
    candidate: &AlertCandidate,
    recipients: &[String],
    channel: NotificationChannel,
    outcome: DeliveryOutcome,
    detail: Option<String>,
) -> NotificationAttempt {
    NotificationAttempt {
        candidate: candidate.clone(),
        recipients: recipients.to_vec(),
        channel,
        outcome,
        detail,
        attempted_at: Utc::now(),
    }
}

async fn deliver(
    channels: &Channels,
    candidate: &AlertCandidate,
    recipients: &[String],
) -> Vec<NotificationAttempt> {
    let message = AlertMessage::from_candidate(candidate, recipients);
    let notify = |kind: NoticeKind, text: String| {
        channels
            .notices
            .publish(OperatorNotice::new(kind, text).with_rule_key(&candidate.rule_key));
    };
    let mut attempts = Vec::with_capacity(2);

    match &channels.primary {
        Some(primary) => match primary.send(&message).await {
            Ok(receipt) => {
                let outcome = if receipt.verified {
                    notify(
                        NoticeKind::Sent,
                        format!("Alert sent via {}: {}", primary.name(), candidate.subject),
                    );
                    DeliveryOutcome::Sent
                } else {
                    notify(
                        NoticeKind::Previewed,
                        format!(
                            "Alert accepted by {} but delivery is unverified: {}",
                            primary.name(),
                            candidate.subject
                        ),
                    );
                    DeliveryOutcome::Previewed
                };
                attempts.push(attempt(
                    candidate,
                    recipients,
                    NotificationChannel::Primary,
                    outcome,
                    receipt.detail,
                ));
                return attempts;
            }
            Err(e) => {
                tracing::warn!(
                    rule_key = %candidate.rule_key,
                    transport = primary.name(),
                    error = %e,
                    "Primary transport failed"
                );
                attempts.push(attempt(
                    candidate,
                    recipients,
                    NotificationChannel::Primary,
                    DeliveryOutcome::Failed,
                    Some(e.to_string()),
                ));
                if !e.triggers_fallback() {
                    notify(
                        NoticeKind::Failed,
                        format!("Alert delivery failed: {}: {e}", candidate.subject),
                    );
                    return attempts;
                }
            }
        },
        None => {
            attempts.push(attempt(
                candidate,
                recipients,
                NotificationChannel::Primary,
                DeliveryOutcome::Failed,
                Some("primary transport not configured".to_string()),
            ));
        }
    }

    let fallback = &channels.fallback;
    match fallback.compose(&message).await {
        Ok(receipt) => {
            notify(
                NoticeKind::Previewed,
                format!(
                    "Alert service unavailable, {} compose prepared: {}",
                    fallback.name(),
                    candidate.subject
                ),
            );
            attempts.push(attempt(
                candidate,
                recipients,
                NotificationChannel::Fallback,
                DeliveryOutcome::Previewed,
                receipt.detail,
            ));
        }
        Err(e) => {
            notify(
                NoticeKind::Failed,
                format!(
                    "Alert delivery failed on every channel: {}: {e}",
                    candidate.subject
                ),
            );
            attempts.push(attempt(
                candidate,
                recipients,
                NotificationChannel::Fallback,
                DeliveryOutcome::Failed,
                Some(e.to_string()),
            ));
        }
    }

    attempts
}
