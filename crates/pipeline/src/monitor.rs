//! Tick pipeline and monitor run loop.
//!
//! [`AlertPipeline::tick`] processes one snapshot synchronously:
//!
//! 1. mirror the snapshot to the real-time channel (fire-and-forget),
//! 2. evaluate every rule,
//! 3. run admission for every candidate; a candidate that fails the
//!    dispatch preconditions (no recipients, malformed) is rejected and
//!    leaves its cooldown untouched,
//! 4. spawn a tracked dispatch for every admitted candidate.
//!
//! Evaluation completes before admission and admission before any dispatch
//! starts. Dispatch completions are never awaited by the tick.
//!
//! [`Monitor::run`] drives ticks on a fixed interval and turns real-time
//! channel events into operator notices.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use damwatch_core::alert::AlertCandidate;
use damwatch_core::evaluator::{evaluate, Evaluation};
use damwatch_core::rate_limiter::{Admission, RateLimiter};
use damwatch_core::rules::AlertRule;
use damwatch_core::snapshot::SensorSnapshot;
use damwatch_core::source::SnapshotSource;
use damwatch_core::types::{RuleKey, Timestamp};
use damwatch_events::{
    DispatchError, DispatchHandle, Dispatcher, NoticeBus, NoticeKind, OperatorNotice,
};
use damwatch_realtime::{ChannelError, ChannelEvent, ConnectionState, RealtimeHandle};

use crate::authority::AuthorityRegistry;

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// Everything that happened during one tick.
#[derive(Debug)]
pub struct TickReport {
    pub evaluation: Evaluation,
    pub admitted: Vec<RuleKey>,
    /// Suppressed keys with the cooldown still remaining.
    pub suppressed: Vec<(RuleKey, chrono::Duration)>,
    /// Candidates the dispatcher refused. Only a refusal at spawn time
    /// (shutdown racing the tick) leaves the cooldown stamped.
    pub rejected: Vec<(RuleKey, DispatchError)>,
    pub dispatches: Vec<DispatchHandle>,
    pub mirrored: Result<(), ChannelError>,
}

// ---------------------------------------------------------------------------
// AlertPipeline
// ---------------------------------------------------------------------------

/// Owns the rule set and the rate limiter; borrows everything else.
pub struct AlertPipeline {
    rules: Vec<AlertRule>,
    limiter: RateLimiter,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<AuthorityRegistry>,
    channel: RealtimeHandle,
    notices: Arc<NoticeBus>,
}

impl AlertPipeline {
    pub fn new(
        rules: Vec<AlertRule>,
        limiter: RateLimiter,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<AuthorityRegistry>,
        channel: RealtimeHandle,
        notices: Arc<NoticeBus>,
    ) -> Self {
        Self {
            rules,
            limiter,
            dispatcher,
            registry,
            channel,
            notices,
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Process one snapshot at wall-clock time `now`.
    pub fn tick(&mut self, snapshot: &SensorSnapshot, now: Timestamp) -> TickReport {
        let mirrored = self.channel.mirror(snapshot);
        if let Err(e) = &mirrored {
            tracing::trace!(error = %e, "Snapshot not mirrored");
        }

        let evaluation = evaluate(snapshot, &self.rules);
        for failure in &evaluation.failures {
            self.notices.publish(
                OperatorNotice::new(
                    NoticeKind::EvaluationError,
                    format!("Rule {} could not be evaluated: {}", failure.rule_key, failure.error),
                )
                .with_rule_key(&failure.rule_key),
            );
        }

        let recipients = if evaluation.candidates.is_empty() {
            Vec::new()
        } else {
            self.registry.recipients()
        };

        // Only candidates that pass the dispatch preconditions stamp the limiter.
        let mut admitted: Vec<&AlertCandidate> = Vec::new();
        let mut suppressed = Vec::new();
        let mut rejected = Vec::new();
        for candidate in &evaluation.candidates {
            match self.limiter.peek(&candidate.rule_key, now) {
                Admission::Admitted => {
                    if let Err(e) = self.dispatcher.validate(candidate, &recipients) {
                        rejected.push((candidate.rule_key.clone(), e));
                        continue;
                    }
                    self.limiter.record(&candidate.rule_key, now);
                    self.notices.publish(
                        OperatorNotice::new(
                            NoticeKind::Admitted,
                            format!("Alert admitted: {}", candidate.subject),
                        )
                        .with_rule_key(&candidate.rule_key),
                    );
                    admitted.push(candidate);
                }
                Admission::Suppressed { remaining } => {
                    self.notices.publish(
                        OperatorNotice::new(
                            NoticeKind::Suppressed,
                            format!(
                                "Alert suppressed, cooldown {}s remaining: {}",
                                remaining.num_seconds(),
                                candidate.subject
                            ),
                        )
                        .with_rule_key(&candidate.rule_key),
                    );
                    suppressed.push((candidate.rule_key.clone(), remaining));
                }
            }
        }

        let mut dispatches = Vec::with_capacity(admitted.len());
        let admitted_keys: Vec<RuleKey> = admitted.iter().map(|c| c.rule_key.clone()).collect();

        for candidate in admitted {
            match self.dispatcher.spawn(candidate.clone(), recipients.clone()) {
                Ok(handle) => dispatches.push(handle),
                Err(e) => rejected.push((candidate.rule_key.clone(), e)),
            }
        }

        TickReport {
            evaluation,
            admitted: admitted_keys,
            suppressed,
            rejected,
            dispatches,
            mirrored,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Periodic driver of an [`AlertPipeline`].
pub struct Monitor {
    pipeline: AlertPipeline,
    source: Box<dyn SnapshotSource>,
    tick_interval: Duration,
    latest: watch::Sender<Option<SensorSnapshot>>,
    notices: Arc<NoticeBus>,
}

impl Monitor {
    pub fn new(
        pipeline: AlertPipeline,
        source: Box<dyn SnapshotSource>,
        tick_interval: Duration,
        notices: Arc<NoticeBus>,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            pipeline,
            source,
            tick_interval,
            latest,
            notices,
        }
    }

    /// Most recent snapshot, `None` before the first tick.
    pub fn latest_snapshot(&self) -> watch::Receiver<Option<SensorSnapshot>> {
        self.latest.subscribe()
    }

    /// Run until cancelled. `channel_events` may close at any time (a
    /// disabled channel closes it immediately); ticking continues.
    pub async fn run(
        mut self,
        mut channel_events: mpsc::Receiver<ChannelEvent>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        tracing::info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            rules = self.pipeline.rules().len(),
            "Monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let snapshot = self.source.next_snapshot(now);
                    let report = self.pipeline.tick(&snapshot, now);
                    tracing::debug!(
                        candidates = report.evaluation.candidates.len(),
                        admitted = report.admitted.len(),
                        suppressed = report.suppressed.len(),
                        "Tick processed"
                    );
                    self.latest.send_replace(Some(snapshot));
                }
                event = channel_events.recv(), if events_open => match event {
                    Some(event) => self.notices.publish(channel_notice(event)),
                    None => events_open = false,
                },
            }
        }
    }
}

/// Observer-facing notice for a real-time channel event.
pub fn channel_notice(event: ChannelEvent) -> OperatorNotice {
    match event {
        ChannelEvent::StateChanged(ConnectionState::Connected) => {
            OperatorNotice::new(NoticeKind::Connected, "Real-time channel connected")
        }
        ChannelEvent::StateChanged(ConnectionState::Connecting) => {
            OperatorNotice::new(NoticeKind::Connecting, "Real-time channel connecting")
        }
        ChannelEvent::StateChanged(ConnectionState::Disconnected) => {
            OperatorNotice::new(NoticeKind::Disconnected, "Real-time channel disconnected")
        }
        ChannelEvent::RemoteAlertSent(sent) => {
            let message = match (sent.simulated, sent.successful, sent.recipients) {
                (true, _, _) => format!("Remote alert simulated: {}", sent.subject),
                (false, Some(ok), Some(total)) => {
                    format!("Remote alert sent to {ok}/{total}: {}", sent.subject)
                }
                _ => format!("Remote alert sent: {}", sent.subject),
            };
            OperatorNotice::new(NoticeKind::RemoteAlertSent, message)
        }
        ChannelEvent::RemoteAlertError(err) => OperatorNotice::new(
            NoticeKind::RemoteAlertError,
            format!("Remote alert failed: {}: {}", err.subject, err.error),
        ),
    }
}
