use std::sync::Arc;

use tokio::sync::watch;

use damwatch_core::snapshot::SensorSnapshot;
use damwatch_events::{Dispatcher, NoticeBus};
use damwatch_pipeline::AuthorityRegistry;
use damwatch_realtime::RealtimeHandle;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything is behind `Arc` or is already a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Operator WebSocket connections.
    pub ws_manager: Arc<WsManager>,
    pub notices: Arc<NoticeBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<AuthorityRegistry>,
    /// Read side of the real-time channel (connection state only).
    pub channel: RealtimeHandle,
    /// Latest snapshot produced by the monitor.
    pub latest: watch::Receiver<Option<SensorSnapshot>>,
}
