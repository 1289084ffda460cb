pub mod agents;
pub mod aggregate;
pub mod targets;
pub mod upload;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use prodgrid_engine::EngineError;
use prodgrid_ingest::IngestError;
use prodgrid_store::StoreError;

/// Map engine failures onto HTTP. Operator mistakes are 4xx with a readable
/// message; storage failures are logged and returned opaque.
pub fn engine_error(e: EngineError) -> Response {
    match &e {
        EngineError::DuplicateKeyConflict { .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": e.to_string(), "duplicate": true })),
        )
            .into_response(),
        EngineError::Ingest(IngestError::ColumnPeriodMismatch { declared, detected }) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": e.to_string(),
                "isColumnMismatch": true,
                "declared": declared.to_string(),
                "detected": detected,
            })),
        )
            .into_response(),
        EngineError::UnknownAgent(_) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
        EngineError::Store(_) => {
            tracing::error!("storage failure: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal storage error" })),
            )
                .into_response()
        }
        _ => bad_request(&e.to_string()),
    }
}

pub fn store_error(e: StoreError) -> Response {
    engine_error(EngineError::Store(e))
}

pub fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}
