use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use chrono::TimeZone;
use tokio::sync::watch;

use damwatch_api::config::ServerConfig;
use damwatch_api::router::build_app_router;
use damwatch_api::state::AppState;
use damwatch_api::ws::WsManager;
use damwatch_core::snapshot::SensorSnapshot;
use damwatch_events::{
    AlertMessage, Dispatcher, FallbackReceipt, FallbackTransport, NoticeBus, PrimaryReceipt,
    PrimaryTransport, TransportError,
};
use damwatch_pipeline::AuthorityRegistry;
use damwatch_realtime::RealtimeHandle;

/// Primary transport that accepts every message and counts calls.
#[derive(Default)]
pub struct AcceptingPrimary {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PrimaryTransport for AcceptingPrimary {
    fn name(&self) -> &'static str {
        "accepting-primary"
    }

    async fn send(&self, _message: &AlertMessage) -> Result<PrimaryReceipt, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PrimaryReceipt::verified(Some("1/1 delivered".into())))
    }
}

pub struct NoopFallback;

#[async_trait]
impl FallbackTransport for NoopFallback {
    fn name(&self) -> &'static str {
        "noop-fallback"
    }

    async fn compose(&self, _message: &AlertMessage) -> Result<FallbackReceipt, TransportError> {
        Ok(FallbackReceipt { detail: None })
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

pub fn sample_snapshot() -> SensorSnapshot {
    SensorSnapshot::new(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap())
        .with_reading("waterLevel", 96.0)
        .with_reading("seismic", 0.4)
}

/// Everything a test needs to drive and inspect the app.
pub struct TestApp {
    pub router: Router,
    pub primary: Arc<AcceptingPrimary>,
    pub registry: Arc<AuthorityRegistry>,
    pub latest: watch::Sender<Option<SensorSnapshot>>,
    _dir: tempfile::TempDir,
}

/// Build the full application router with all middleware layers, backed by
/// in-memory transports and a registry seeded with `seed`.
pub async fn build_test_app(seed: &[&str]) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let notices = Arc::new(NoticeBus::default());
    let primary = Arc::new(AcceptingPrimary::default());
    let dispatcher = Arc::new(Dispatcher::new(
        Some(Arc::clone(&primary) as Arc<dyn PrimaryTransport>),
        Arc::new(NoopFallback),
        Arc::clone(&notices),
    ));
    let registry = Arc::new(
        AuthorityRegistry::open(
            None,
            dir.path().join("authorities.json"),
            seed.iter().map(|s| s.to_string()).collect(),
            Arc::clone(&notices),
        )
        .await,
    );
    let (latest, latest_rx) = watch::channel(None);

    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
        notices,
        dispatcher,
        registry: Arc::clone(&registry),
        channel: RealtimeHandle::disabled(),
        latest: latest_rx,
    };

    TestApp {
        router: build_app_router(state, &config).unwrap(),
        primary,
        registry,
        latest,
        _dir: dir,
    }
}
