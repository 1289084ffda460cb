use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use prodgrid_core::{IngestContext, Month};
use prodgrid_engine::{ingest_direct, ingest_workbook, unmapped_idents};

use crate::api::{bad_request, engine_error, store_error};
use crate::state::AppState;

/// Multipart fields accompanying a carrier submission. A submission may
/// carry several `file` parts; their rows are ingested as one batch.
struct UploadForm {
    files: Vec<Vec<u8>>,
    carrier_id: Option<i64>,
    month: Option<Month>,
    context: Option<IngestContext>,
    overwrite: bool,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, Response> {
    let mut form = UploadForm {
        files: Vec::new(),
        carrier_id: None,
        month: None,
        context: None,
        overwrite: false,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("multipart: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.files.push(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(&format!("file field: {e}")))?
                        .to_vec(),
                );
            }
            "carrier_id" => {
                let text = field.text().await.map_err(|e| bad_request(&e.to_string()))?;
                form.carrier_id =
                    Some(text.trim().parse().map_err(|_| bad_request("carrier_id: not a number"))?);
            }
            "month" => {
                let text = field.text().await.map_err(|e| bad_request(&e.to_string()))?;
                form.month = Some(
                    Month::parse(text.trim())
                        .ok_or_else(|| bad_request("month: expected YYYY-MM"))?,
                );
            }
            "ingestion_context" => {
                let text = field.text().await.map_err(|e| bad_request(&e.to_string()))?;
                form.context = Some(
                    IngestContext::parse(text.trim())
                        .ok_or_else(|| bad_request("ingestion_context: production or elementary"))?,
                );
            }
            "overwrite" => {
                let text = field.text().await.map_err(|e| bad_request(&e.to_string()))?;
                form.overwrite = text.trim() == "true";
            }
            _ => {}
        }
    }
    if form.files.iter().all(|f| f.is_empty()) {
        return Err(bad_request("missing file field"));
    }
    Ok(form)
}

/// POST /upload: ingest one or more carrier files for a declared
/// (carrier, month, context) key.
pub async fn upload_file(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };
    let (Some(carrier_id), Some(month), Some(context)) =
        (form.carrier_id, form.month, form.context)
    else {
        return bad_request("carrier_id, month and ingestion_context are required");
    };

    let mut store = state.store();
    match ingest_workbook(
        &mut store,
        &state.registry,
        carrier_id,
        month,
        context,
        &form.files,
        form.overwrite,
    ) {
        Ok(outcome) => {
            tracing::info!(
                carrier_id,
                month = %month,
                context = %context,
                files = form.files.len(),
                rows = outcome.batch.row_count,
                warnings = outcome.warnings.len(),
                "workbook ingested"
            );
            Json(json!({
                "rowsInserted": outcome.batch.row_count,
                "warnings": outcome.warnings,
            }))
            .into_response()
        }
        Err(e) => engine_error(e),
    }
}

/// POST /upload/upload-direct-agents: ingest the direct-business workbook
/// for one month.
pub async fn upload_direct(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };
    let Some(month) = form.month else {
        return bad_request("month is required");
    };
    let Some(bytes) = form.files.first() else {
        return bad_request("missing file field");
    };

    let mut store = state.store();
    match ingest_direct(&mut store, &state.registry, month, bytes, form.overwrite) {
        Ok(outcome) => {
            tracing::info!(month = %month, batches = outcome.batches.len(), "direct business ingested");
            Json(json!({ "warnings": outcome.warnings })).into_response()
        }
        Err(e) => engine_error(e),
    }
}

#[derive(Deserialize, Default)]
pub struct BatchListQuery {
    ingestion_context: Option<String>,
}

/// GET /upload/records: recorded batches, optionally narrowed to one line.
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchListQuery>,
) -> Response {
    let context = match &query.ingestion_context {
        Some(s) => match IngestContext::parse(s) {
            Some(c) => Some(c),
            None => return bad_request("ingestion_context: production or elementary"),
        },
        None => None,
    };
    match state.store().batches(context) {
        Ok(batches) => Json(batches).into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Deserialize)]
pub struct BatchKey {
    /// Absent means every carrier uploaded for the month.
    carrier_id: Option<i64>,
    month: String,
    ingestion_context: String,
}

/// DELETE /upload/records: drop a month's batches with their raw rows and
/// aggregates, across all carriers or scoped to one.
pub async fn delete_batch(
    State(state): State<AppState>,
    Query(key): Query<BatchKey>,
) -> Response {
    let Some(month) = Month::parse(&key.month) else {
        return bad_request("month: expected YYYY-MM");
    };
    let Some(context) = IngestContext::parse(&key.ingestion_context) else {
        return bad_request("ingestion_context: production or elementary");
    };
    match state.store().delete_batches(key.carrier_id, month, context) {
        Ok((raw_data_deleted, aggregations_deleted)) => {
            tracing::info!(
                carrier_id = ?key.carrier_id,
                month = %month,
                context = %context,
                raw_data_deleted,
                aggregations_deleted,
                "batches deleted"
            );
            Json(json!({
                "rawDataDeleted": raw_data_deleted,
                "aggregationsDeleted": aggregations_deleted,
            }))
            .into_response()
        }
        Err(e) => store_error(e),
    }
}

#[derive(Deserialize, Default)]
pub struct UnmappedQuery {
    carrier_id: Option<i64>,
    month: Option<String>,
    ingestion_context: Option<String>,
}

/// GET /upload/unmapped: the per-carrier unmapped bucket rows, plus a
/// per-identifier breakdown of the raw rows behind them.
pub async fn unmapped(
    State(state): State<AppState>,
    Query(query): Query<UnmappedQuery>,
) -> Response {
    let month = match &query.month {
        Some(s) => match Month::parse(s) {
            Some(m) => Some(m),
            None => return bad_request("month: expected YYYY-MM"),
        },
        None => None,
    };
    let context = match &query.ingestion_context {
        Some(s) => match IngestContext::parse(s) {
            Some(c) => Some(c),
            None => return bad_request("ingestion_context: production or elementary"),
        },
        None => None,
    };
    let store = state.store();
    let buckets = match store.unmapped_aggregates() {
        Ok(rows) => rows,
        Err(e) => return store_error(e),
    };
    match unmapped_idents(&store, query.carrier_id, month, context) {
        Ok(idents) => Json(json!({ "buckets": buckets, "idents": idents })).into_response(),
        Err(e) => engine_error(e),
    }
}
