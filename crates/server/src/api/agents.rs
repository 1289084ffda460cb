use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use prodgrid_core::Agent;
use prodgrid_engine::{remove_agent, save_agent};

use crate::api::{bad_request, engine_error, not_found, store_error};
use crate::state::AppState;

/// GET /agents
pub async fn list(State(state): State<AppState>) -> Response {
    match state.store().agents() {
        Ok(agents) => Json(agents).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /agents/{id}
pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store().agent(id) {
        Ok(Some(agent)) => Json(agent).into_response(),
        Ok(None) => not_found(&format!("no agent with id {id}")),
        Err(e) => store_error(e),
    }
}

/// POST /agents: create or replace an agent. The identifier lists decide
/// which aggregate groups get rebuilt.
pub async fn create(State(state): State<AppState>, Json(agent): Json<Agent>) -> Response {
    let mut store = state.store();
    match save_agent(&mut store, &state.registry, &agent) {
        Ok(report) => {
            tracing::info!(
                agent_id = agent.id,
                months = report.production.months_re_aggregated
                    + report.elementary.months_re_aggregated,
                "agent saved"
            );
            Json(json!({ "agent": agent, "reAggregation": report })).into_response()
        }
        Err(e) => engine_error(e),
    }
}

/// PUT /agents/{id}: update an agent; the path id wins over the body's.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut agent): Json<Agent>,
) -> Response {
    if agent.id != 0 && agent.id != id {
        return bad_request("body id does not match path id");
    }
    agent.id = id;
    let mut store = state.store();
    match save_agent(&mut store, &state.registry, &agent) {
        Ok(report) => {
            tracing::info!(
                agent_id = id,
                months = report.production.months_re_aggregated
                    + report.elementary.months_re_aggregated,
                "agent updated"
            );
            Json(json!({ "agent": agent, "reAggregation": report })).into_response()
        }
        Err(e) => engine_error(e),
    }
}

/// DELETE /agents/{id}: remove an agent; its production returns to the
/// unmapped buckets.
pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let mut store = state.store();
    match remove_agent(&mut store, &state.registry, id) {
        Ok(report) => {
            tracing::info!(
                agent_id = id,
                months = report.production.months_re_aggregated
                    + report.elementary.months_re_aggregated,
                "agent removed"
            );
            Json(json!({ "reAggregation": report })).into_response()
        }
        Err(e) => engine_error(e),
    }
}

#[derive(Serialize)]
pub struct CompanyInfo {
    pub id: i64,
    pub name: String,
    pub aliases: Vec<String>,
    pub production: bool,
    pub elementary: bool,
}

/// GET /companies: the carrier catalog, as the registry knows it.
pub async fn companies(State(state): State<AppState>) -> Response {
    let companies: Vec<CompanyInfo> = state
        .registry
        .carriers()
        .map(|c| CompanyInfo {
            id: c.id,
            name: c.name.clone(),
            aliases: c.aliases.clone(),
            production: c.production.is_some(),
            elementary: c.elementary.is_some(),
        })
        .collect();
    Json(companies).into_response()
}
