use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use damwatch_core::error::CoreError;
use damwatch_events::DispatchError;
use damwatch_pipeline::{ManualAlertError, RegistryError};

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce `{ "error", "code" }` JSON bodies.
/// Internal details are logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A manual alert was requested before the first tick.
    #[error("No sensor snapshot has been captured yet")]
    NoSnapshot,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<ManualAlertError> for AppError {
    fn from(err: ManualAlertError) -> Self {
        match err {
            ManualAlertError::NoSnapshot => AppError::NoSnapshot,
            ManualAlertError::Dispatch(e) => AppError::Dispatch(e),
        }
    }
}

fn internal(msg: impl std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => internal(msg),
            },

            AppError::Dispatch(err) => match err {
                DispatchError::NoRecipients => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "NO_RECIPIENTS",
                    err.to_string(),
                ),
                DispatchError::MalformedCandidate(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "MALFORMED_ALERT",
                    err.to_string(),
                ),
                DispatchError::ShuttingDown => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SHUTTING_DOWN",
                    err.to_string(),
                ),
            },

            AppError::Registry(err) => match err {
                RegistryError::NotConfigured => {
                    (StatusCode::CONFLICT, "NOT_CONFIGURED", err.to_string())
                }
                RegistryError::Empty => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "EMPTY_AUTHORITY_LIST",
                    err.to_string(),
                ),
                RegistryError::Unreachable(_) | RegistryError::Malformed(_) => {
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
                }
                RegistryError::Cache(msg) => internal(msg),
            },

            AppError::NoSnapshot => (StatusCode::CONFLICT, "NO_SNAPSHOT", self.to_string()),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
