//! Handlers for the authority (recipient) list.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use damwatch_core::recipients::parse_recipient_list;
use damwatch_pipeline::AuthorityList;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `PUT /authorities`: either an explicit list or a raw comma list
/// as typed by the operator.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SaveAuthoritiesRequest {
    List { authorities: Vec<String> },
    Raw { raw: String },
}

impl SaveAuthoritiesRequest {
    pub fn into_addresses(self) -> Vec<String> {
        match self {
            SaveAuthoritiesRequest::List { authorities } => authorities,
            SaveAuthoritiesRequest::Raw { raw } => parse_recipient_list(&raw),
        }
    }
}

/// GET /api/v1/authorities
pub async fn get_authorities(State(state): State<AppState>) -> Json<DataResponse<AuthorityList>> {
    Json(DataResponse {
        data: state.registry.current(),
    })
}

/// PUT /api/v1/authorities
pub async fn save_authorities(
    State(state): State<AppState>,
    Json(body): Json<SaveAuthoritiesRequest>,
) -> AppResult<Json<DataResponse<AuthorityList>>> {
    let list = state.registry.save(body.into_addresses()).await?;
    tracing::info!(count = list.addresses.len(), "Authority list overridden by operator");
    Ok(Json(DataResponse { data: list }))
}

/// POST /api/v1/authorities/refresh
pub async fn refresh_authorities(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<AuthorityList>>> {
    let list = state.registry.refresh().await?;
    Ok(Json(DataResponse { data: list }))
}
