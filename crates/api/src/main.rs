use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use damwatch_api::config::ServerConfig;
use damwatch_api::notices::NoticeForwarder;
use damwatch_api::router::build_app_router;
use damwatch_api::state::AppState;
use damwatch_api::ws;
use damwatch_core::rate_limiter::RateLimiter;
use damwatch_core::rules::validate_rules;
use damwatch_core::source::{SimulatedSource, SnapshotSource};
use damwatch_events::{
    Dispatcher, EmailConfig, EmailTransport, HttpAlertService, MailtoComposer, NoticeBus,
    PrimaryTransport,
};
use damwatch_pipeline::{
    AlertPipeline, AuthorityRegistry, AuthoritySource, HttpAuthoritySource, Monitor,
    MonitorConfig,
};
use damwatch_realtime::{ChannelConfig, RealtimeChannel, RealtimeHandle};

type StartupError = Box<dyn std::error::Error + Send + Sync>;

/// Time allowed for background loops to stop after cancellation.
const LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "damwatch=info,damwatch_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "damwatch failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    // --- Configuration ---
    let server_config = ServerConfig::from_env()?;
    let monitor_config = MonitorConfig::from_env()?;
    tracing::info!(
        host = %server_config.host,
        port = server_config.port,
        tick_secs = monitor_config.tick_interval.as_secs(),
        cooldown_secs = monitor_config.cooldown.num_seconds(),
        "Loaded configuration"
    );

    let rules = monitor_config.load_rules()?;
    validate_rules(&rules)?;
    tracing::info!(count = rules.len(), "Alert rules loaded");

    // --- Notice bus ---
    let notices = Arc::new(NoticeBus::default());

    // --- Delivery ---
    let primary: Option<Arc<dyn PrimaryTransport>> = match (
        &monitor_config.alert_service_url,
        EmailConfig::from_env(),
    ) {
        (Some(url), _) => {
            let service = HttpAlertService::new(url)?;
            tracing::info!(endpoint = %service.endpoint(), "Primary transport: HTTP alert service");
            Some(Arc::new(service) as Arc<dyn PrimaryTransport>)
        }
        (None, Some(email)) => {
            tracing::info!(host = %email.smtp_host, "Primary transport: SMTP");
            Some(Arc::new(EmailTransport::new(email)?) as Arc<dyn PrimaryTransport>)
        }
        (None, None) => {
            tracing::warn!("No primary transport configured, alerts go straight to compose fallback");
            None
        }
    };
    let fallback = match &monitor_config.compose_opener {
        Some(opener) => MailtoComposer::with_opener(opener.clone()),
        None => MailtoComposer::new(),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        primary,
        Arc::new(fallback),
        Arc::clone(&notices),
    ));

    // --- Authority registry ---
    let authority_source: Option<Arc<dyn AuthoritySource>> =
        match &monitor_config.authority_service_url {
            Some(url) => Some(Arc::new(HttpAuthoritySource::new(url)?) as Arc<dyn AuthoritySource>),
            None => None,
        };
    let registry = Arc::new(
        AuthorityRegistry::open(
            authority_source,
            monitor_config.authority_cache_path.clone(),
            monitor_config.authority_seed.clone(),
            Arc::clone(&notices),
        )
        .await,
    );

    // --- Real-time channel ---
    let cancel = CancellationToken::new();
    let (channel, channel_events, channel_task) = match &monitor_config.realtime_ws_url {
        Some(url) => {
            let (handle, events, task) =
                RealtimeChannel::spawn(ChannelConfig::new(url.clone()), cancel.child_token());
            (handle, events, Some(task))
        }
        None => {
            tracing::info!("REALTIME_WS_URL not set, snapshot mirroring disabled");
            let (_tx, events) = mpsc::channel(1);
            (RealtimeHandle::disabled(), events, None)
        }
    };

    // --- Monitor ---
    let source: Box<dyn SnapshotSource> = match monitor_config.simulation_seed {
        Some(seed) => Box::new(SimulatedSource::seeded(seed)),
        None => Box::new(SimulatedSource::from_entropy()),
    };
    let pipeline = AlertPipeline::new(
        rules,
        RateLimiter::new(monitor_config.cooldown),
        Arc::clone(&dispatcher),
        Arc::clone(&registry),
        channel.clone(),
        Arc::clone(&notices),
    );
    let monitor = Monitor::new(
        pipeline,
        source,
        monitor_config.tick_interval,
        Arc::clone(&notices),
    );
    let latest = monitor.latest_snapshot();
    let monitor_task = tokio::spawn(monitor.run(channel_events, cancel.clone()));

    let registry_task = {
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        let interval = monitor_config.authority_refresh_interval;
        tokio::spawn(async move { registry.run(interval, cancel).await })
    };

    // --- Operator WebSocket ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_task = ws::start_heartbeat(Arc::clone(&ws_manager), cancel.clone());
    let forwarder_task = tokio::spawn(
        NoticeForwarder::new(Arc::clone(&ws_manager)).run(notices.subscribe()),
    );

    // --- App state + router ---
    let state = AppState {
        config: Arc::new(server_config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        notices: Arc::clone(&notices),
        dispatcher: Arc::clone(&dispatcher),
        registry: Arc::clone(&registry),
        channel,
        latest,
    };
    let app = build_app_router(state, &server_config)?;

    // --- Start server ---
    let addr = SocketAddr::new(server_config.host.parse()?, server_config.port);
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(LOOP_STOP_TIMEOUT, monitor_task).await;
    let _ = tokio::time::timeout(LOOP_STOP_TIMEOUT, registry_task).await;
    tracing::info!("Monitor and authority refresh stopped");

    let summary = dispatcher.shutdown(monitor_config.shutdown_grace).await;
    tracing::info!(abandoned = summary.abandoned, "Dispatcher shut down");

    if let Some(task) = channel_task {
        let _ = tokio::time::timeout(LOOP_STOP_TIMEOUT, task).await;
        tracing::info!("Real-time channel stopped");
    }

    // Let the forwarder flush the final notices before closing clients.
    tokio::task::yield_now().await;
    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing operator WebSocket connections");
    ws_manager.shutdown_all().await;
    forwarder_task.abort();
    let _ = heartbeat_task.await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Resolve on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
