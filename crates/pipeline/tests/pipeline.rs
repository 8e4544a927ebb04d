//! Integration tests for the tick pipeline, the monitor loop and manual
//! alerts. Transports are in-memory mocks; the real-time channel is
//! disabled unless a test needs events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::TimeZone;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use damwatch_core::alert::{DeliveryOutcome, NotificationChannel, Severity};
use damwatch_core::rate_limiter::RateLimiter;
use damwatch_core::rules::{AlertRule, Comparator};
use damwatch_core::snapshot::SensorSnapshot;
use damwatch_core::source::ScriptedSource;
use damwatch_core::types::Timestamp;
use damwatch_events::{
    AlertMessage, DispatchError, Dispatcher, FallbackReceipt, FallbackTransport, NoticeBus,
    NoticeKind, OperatorNotice, PrimaryReceipt, PrimaryTransport, TransportError,
};
use damwatch_pipeline::{
    send_manual_alert, AlertPipeline, AuthorityRegistry, ManualAlertError, ManualAlertKind,
    Monitor,
};
use damwatch_realtime::{ChannelError, ChannelEvent, ConnectionState, RealtimeHandle};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct CountingPrimary {
    error: Option<TransportError>,
    calls: AtomicUsize,
}

#[async_trait]
impl PrimaryTransport for CountingPrimary {
    fn name(&self) -> &'static str {
        "counting-primary"
    }

    async fn send(&self, message: &AlertMessage) -> Result<PrimaryReceipt, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(PrimaryReceipt::verified(Some(format!(
                "{n}/{n} delivered",
                n = message.recipients.len()
            )))),
        }
    }
}

struct CountingFallback {
    calls: AtomicUsize,
}

#[async_trait]
impl FallbackTransport for CountingFallback {
    fn name(&self) -> &'static str {
        "counting-fallback"
    }

    async fn compose(&self, _message: &AlertMessage) -> Result<FallbackReceipt, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FallbackReceipt {
            detail: Some("mailto:ops@dam.gov".into()),
        })
    }
}

struct Harness {
    pipeline: AlertPipeline,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<AuthorityRegistry>,
    primary: Arc<CountingPrimary>,
    fallback: Arc<CountingFallback>,
    notices: broadcast::Receiver<OperatorNotice>,
    bus: Arc<NoticeBus>,
    _dir: tempfile::TempDir,
}

async fn harness(
    rules: Vec<AlertRule>,
    primary_error: Option<TransportError>,
    seed: Vec<String>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(NoticeBus::default());
    let notices = bus.subscribe();

    let primary = Arc::new(CountingPrimary {
        error: primary_error,
        calls: AtomicUsize::new(0),
    });
    let fallback = Arc::new(CountingFallback {
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Arc::new(Dispatcher::new(
        Some(Arc::clone(&primary) as Arc<dyn PrimaryTransport>),
        Arc::clone(&fallback) as Arc<dyn FallbackTransport>,
        Arc::clone(&bus),
    ));
    let registry = Arc::new(
        AuthorityRegistry::open(
            None,
            dir.path().join("authorities.json"),
            seed,
            Arc::clone(&bus),
        )
        .await,
    );

    let pipeline = AlertPipeline::new(
        rules,
        RateLimiter::default(),
        Arc::clone(&dispatcher),
        Arc::clone(&registry),
        RealtimeHandle::disabled(),
        Arc::clone(&bus),
    );

    Harness {
        pipeline,
        dispatcher,
        registry,
        primary,
        fallback,
        notices,
        bus,
        _dir: dir,
    }
}

fn water_rule() -> AlertRule {
    AlertRule::threshold("waterLevel", "waterLevel", Comparator::Above, 95.0, Severity::Critical)
}

fn seismic_rule() -> AlertRule {
    AlertRule::threshold("seismic", "seismic", Comparator::Above, 0.9, Severity::Critical)
}

fn t0() -> Timestamp {
    chrono::Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
}

fn snapshot(at: Timestamp, readings: &[(&str, f64)]) -> SensorSnapshot {
    readings
        .iter()
        .fold(SensorSnapshot::new(at), |s, (k, v)| s.with_reading(*k, *v))
}

fn ops() -> Vec<String> {
    vec!["ops@dam.gov".into()]
}

fn drain(rx: &mut broadcast::Receiver<OperatorNotice>) -> Vec<NoticeKind> {
    let mut kinds = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        kinds.push(notice.kind);
    }
    kinds
}

// ---------------------------------------------------------------------------
// Test: repeated breach is suppressed inside the cooldown and re-admitted after
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_breach_respects_cooldown() {
    let mut h = harness(vec![water_rule()], None, ops()).await;
    let t1 = t0() + chrono::Duration::seconds(1);
    let t2 = t0() + chrono::Duration::minutes(5) + chrono::Duration::seconds(1);

    let first = h.pipeline.tick(&snapshot(t0(), &[("waterLevel", 96.0)]), t0());
    assert_eq!(first.evaluation.candidates.len(), 1);
    assert_eq!(first.admitted, vec!["waterLevel".to_string()]);
    assert_eq!(first.dispatches.len(), 1);

    let second = h.pipeline.tick(&snapshot(t1, &[("waterLevel", 96.0)]), t1);
    assert!(second.admitted.is_empty());
    assert_eq!(second.suppressed.len(), 1);
    assert_eq!(second.suppressed[0].1, chrono::Duration::seconds(299));
    assert!(second.dispatches.is_empty());

    let third = h.pipeline.tick(&snapshot(t2, &[("waterLevel", 96.0)]), t2);
    assert_eq!(third.admitted.len(), 1);

    for handle in first.dispatches.into_iter().chain(third.dispatches) {
        assert_eq!(handle.wait().await.outcome, DeliveryOutcome::Sent);
    }
    assert_eq!(h.primary.calls.load(Ordering::SeqCst), 2);

    let kinds = drain(&mut h.notices);
    assert_eq!(
        kinds.iter().filter(|k| **k == NoticeKind::Admitted).count(),
        2
    );
    assert_eq!(
        kinds.iter().filter(|k| **k == NoticeKind::Suppressed).count(),
        1
    );
    assert_eq!(kinds.iter().filter(|k| **k == NoticeKind::Sent).count(), 2);
}

// ---------------------------------------------------------------------------
// Test: two rules breached together are admitted on separate windows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simultaneous_breaches_have_independent_windows() {
    let mut h = harness(vec![water_rule(), seismic_rule()], None, ops()).await;

    let only_water = h.pipeline.tick(
        &snapshot(t0(), &[("waterLevel", 96.0), ("seismic", 0.5)]),
        t0(),
    );
    assert_eq!(only_water.admitted, vec!["waterLevel".to_string()]);

    let t1 = t0() + chrono::Duration::seconds(10);
    let both = h.pipeline.tick(
        &snapshot(t1, &[("waterLevel", 97.0), ("seismic", 1.1)]),
        t1,
    );
    assert_eq!(both.evaluation.candidates.len(), 2);
    assert_eq!(both.admitted, vec!["seismic".to_string()]);
    assert_eq!(both.suppressed.len(), 1);
    assert_eq!(both.suppressed[0].0, "waterLevel");

    for handle in only_water.dispatches.into_iter().chain(both.dispatches) {
        handle.wait().await;
    }
    assert_eq!(h.primary.calls.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Test: unreachable primary falls back to compose and reports previewed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_primary_is_previewed_through_fallback() {
    let mut h = harness(
        vec![water_rule()],
        Some(TransportError::Unreachable("connection refused".into())),
        ops(),
    )
    .await;

    let mut report = h.pipeline.tick(&snapshot(t0(), &[("waterLevel", 96.0)]), t0());
    let handle = report.dispatches.pop().unwrap();
    let result = handle.wait().await;

    assert_eq!(result.outcome, DeliveryOutcome::Previewed);
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].channel, NotificationChannel::Primary);
    assert_eq!(result.attempts[0].outcome, DeliveryOutcome::Failed);
    assert_eq!(result.attempts[1].channel, NotificationChannel::Fallback);
    assert_eq!(h.fallback.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Test: an empty authority list rejects dispatch without consuming the cooldown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_authority_list_rejects_without_network() {
    let mut h = harness(vec![water_rule()], None, Vec::new()).await;
    assert!(h.registry.current().is_empty());

    let report = h.pipeline.tick(&snapshot(t0(), &[("waterLevel", 96.0)]), t0());
    assert!(report.admitted.is_empty());
    assert!(report.suppressed.is_empty());
    assert!(report.dispatches.is_empty());
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].1, DispatchError::NoRecipients);
    assert_eq!(h.primary.calls.load(Ordering::SeqCst), 0);

    let kinds = drain(&mut h.notices);
    assert!(kinds.contains(&NoticeKind::Rejected));
    assert!(!kinds.contains(&NoticeKind::Admitted));
}

// ---------------------------------------------------------------------------
// Test: a breach rejected for lack of recipients is delivered as soon as
// recipients are configured
// ---------------------------------------------------------------------------

#[tokio::test]
async fn breach_is_delivered_once_recipients_are_saved() {
    let mut h = harness(vec![water_rule()], None, Vec::new()).await;

    let first = h.pipeline.tick(&snapshot(t0(), &[("waterLevel", 96.0)]), t0());
    assert_eq!(first.rejected.len(), 1);

    h.registry.save(ops()).await.unwrap();

    let t1 = t0() + chrono::Duration::seconds(5);
    let mut second = h.pipeline.tick(&snapshot(t1, &[("waterLevel", 99.0)]), t1);
    assert!(second.suppressed.is_empty());
    assert_eq!(second.admitted, vec!["waterLevel".to_string()]);
    assert_eq!(second.dispatches.len(), 1);

    let handle = second.dispatches.pop().unwrap();
    let result = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(result.outcome, DeliveryOutcome::Sent);
    assert_eq!(h.primary.calls.load(Ordering::SeqCst), 1);

    // The window now runs from the delivered tick.
    let t2 = t1 + chrono::Duration::seconds(30);
    let third = h.pipeline.tick(&snapshot(t2, &[("waterLevel", 99.0)]), t2);
    assert_eq!(third.suppressed.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: mirroring failure does not affect evaluation or dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mirror_failure_is_independent_of_dispatch() {
    let mut h = harness(vec![water_rule()], None, ops()).await;

    let report = h.pipeline.tick(&snapshot(t0(), &[("waterLevel", 96.0)]), t0());
    assert_matches!(report.mirrored, Err(ChannelError::Disabled));
    assert_eq!(report.dispatches.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: a rule that cannot be evaluated is surfaced, others still run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn evaluation_error_is_published_as_notice() {
    let mut h = harness(vec![seismic_rule(), water_rule()], None, ops()).await;

    let report = h.pipeline.tick(&snapshot(t0(), &[("waterLevel", 96.0)]), t0());
    assert_eq!(report.evaluation.failures.len(), 1);
    assert_eq!(report.admitted, vec!["waterLevel".to_string()]);

    let kinds = drain(&mut h.notices);
    assert_eq!(kinds[0], NoticeKind::EvaluationError);
}

// ---------------------------------------------------------------------------
// Test: manual alerts bypass the limiter but keep dispatch preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_alerts_bypass_cooldown() {
    let h = harness(vec![water_rule()], None, ops()).await;
    let snap = snapshot(t0(), &[("waterLevel", 80.0)]);

    for _ in 0..2 {
        let report = send_manual_alert(
            &h.dispatcher,
            ManualAlertKind::Sos,
            Some(&snap),
            h.registry.recipients(),
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(report.rule_key, "manual.sos");
        assert_eq!(report.outcome, DeliveryOutcome::Sent);
    }
    assert_eq!(h.primary.calls.load(Ordering::SeqCst), 2);

    let missing = send_manual_alert(&h.dispatcher, ManualAlertKind::Test, None, ops(), t0()).await;
    assert_matches!(missing, Err(ManualAlertError::NoSnapshot));

    let empty =
        send_manual_alert(&h.dispatcher, ManualAlertKind::Test, Some(&snap), Vec::new(), t0())
            .await;
    assert_matches!(
        empty,
        Err(ManualAlertError::Dispatch(DispatchError::NoRecipients))
    );
}

// ---------------------------------------------------------------------------
// Test: monitor ticks, publishes the latest snapshot and maps channel events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_ticks_and_reports_channel_events() {
    let h = harness(vec![water_rule()], None, ops()).await;
    let source = ScriptedSource::new(vec![snapshot(t0(), &[("waterLevel", 96.0)])]);
    let monitor = Monitor::new(
        h.pipeline,
        Box::new(source),
        Duration::from_millis(10),
        Arc::clone(&h.bus),
    );
    let mut latest = monitor.latest_snapshot();
    let mut notices = h.bus.subscribe();

    let (events_tx, events_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(monitor.run(events_rx, cancel.clone()));

    events_tx
        .send(ChannelEvent::StateChanged(ConnectionState::Connected))
        .await
        .unwrap();

    tokio::time::timeout(WAIT, latest.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        latest.borrow().as_ref().and_then(|s| s.get("waterLevel")),
        Some(96.0)
    );

    tokio::time::timeout(WAIT, async {
        loop {
            let notice = notices.recv().await.unwrap();
            if notice.kind == NoticeKind::Connected {
                break;
            }
        }
    })
    .await
    .unwrap();

    // Closing the event queue must not stop ticking.
    drop(events_tx);
    tokio::time::timeout(WAIT, latest.changed())
        .await
        .unwrap()
        .unwrap();

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(h.primary.calls.load(Ordering::SeqCst) <= 1);
}
