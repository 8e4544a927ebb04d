pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                       operator notice stream (WebSocket)
/// /status                   GET   channel state, recipients, latest snapshot
/// /authorities              GET   current list
///                           PUT   operator override
/// /authorities/refresh      POST  on-demand remote refresh
/// /alerts/{kind}            POST  manual alert (kind = test | sos)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/status", get(handlers::status::get_status))
        .route(
            "/authorities",
            get(handlers::authorities::get_authorities).put(handlers::authorities::save_authorities),
        )
        .route(
            "/authorities/refresh",
            post(handlers::authorities::refresh_authorities),
        )
        .route("/alerts/{kind}", post(handlers::alerts::send_alert))
}
