use axum::extract::State;
use axum::Json;
use serde::Serialize;

use damwatch_core::snapshot::SensorSnapshot;
use damwatch_pipeline::ListOrigin;
use damwatch_realtime::ConnectionState;

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub realtime_enabled: bool,
    pub realtime_state: ConnectionState,
    pub recipient_count: usize,
    pub authority_origin: ListOrigin,
    pub in_flight_dispatches: usize,
    pub operator_connections: usize,
    pub latest_snapshot: Option<SensorSnapshot>,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<DataResponse<StatusResponse>> {
    let authorities = state.registry.current();
    let latest_snapshot = state.latest.borrow().clone();

    Json(DataResponse {
        data: StatusResponse {
            realtime_enabled: state.channel.is_enabled(),
            realtime_state: state.channel.state(),
            recipient_count: authorities.addresses.len(),
            authority_origin: authorities.origin,
            in_flight_dispatches: state.dispatcher.in_flight(),
            operator_connections: state.ws_manager.connection_count().await,
            latest_snapshot,
        },
    })
}
