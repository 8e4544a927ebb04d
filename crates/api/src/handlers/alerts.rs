use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use damwatch_events::DispatchReport;
use damwatch_pipeline::{send_manual_alert, ManualAlertKind};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/alerts/{kind}
///
/// Dispatches a manual `test` or `sos` alert built from the latest snapshot
/// and waits for the delivery report. Manual alerts are not rate limited.
pub async fn send_alert(
    State(state): State<AppState>,
    Path(kind): Path<ManualAlertKind>,
) -> AppResult<Json<DataResponse<DispatchReport>>> {
    let snapshot = state.latest.borrow().clone();
    let report = send_manual_alert(
        &state.dispatcher,
        kind,
        snapshot.as_ref(),
        state.registry.recipients(),
        Utc::now(),
    )
    .await?;
    Ok(Json(DataResponse { data: report }))
}
