//! Tests for `AppError` to HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server is
//! started.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;

use damwatch_api::error::AppError;
use damwatch_core::error::CoreError;
use damwatch_events::DispatchError;
use damwatch_pipeline::{ManualAlertError, RegistryError};

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: core errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("threshold must be finite".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "threshold must be finite");
}

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("smtp password rejected".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Test: dispatch preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_recipients_returns_422() {
    let (status, json) = error_to_response(DispatchError::NoRecipients.into()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "NO_RECIPIENTS");
    assert_eq!(json["error"], "Recipient list is empty");
}

#[tokio::test]
async fn shutting_down_returns_503() {
    let (status, json) = error_to_response(DispatchError::ShuttingDown.into()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SHUTTING_DOWN");
}

// ---------------------------------------------------------------------------
// Test: registry errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upstream_registry_failure_returns_502() {
    let err = AppError::Registry(RegistryError::Unreachable("connection refused".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "UPSTREAM_ERROR");
    assert_eq!(
        json["error"],
        "Authority source unreachable: connection refused"
    );
}

#[tokio::test]
async fn cache_failure_is_sanitized() {
    let err = AppError::Registry(RegistryError::Cache("/var/lib/damwatch: EACCES".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Test: manual alert errors unwrap into their HTTP mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_alert_errors_map_through() {
    let (status, json) = error_to_response(ManualAlertError::NoSnapshot.into()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "NO_SNAPSHOT");

    let err = ManualAlertError::Dispatch(DispatchError::NoRecipients);
    let (status, json) = error_to_response(err.into()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "NO_RECIPIENTS");
}
