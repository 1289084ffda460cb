use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use prodgrid_core::{Agent, AgentRef, IngestContext, Month, ProductTotals};
use prodgrid_store::{AggregateFilter, RowKind};

use crate::api::{bad_request, store_error};
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct AggregateParams {
    company_id: Option<i64>,
    start_month: Option<String>,
    end_month: Option<String>,
    ingestion_context: Option<String>,
    department: Option<String>,
    inspector: Option<String>,
    agent_name: Option<String>,
}

#[derive(Serialize)]
struct AgentTotalsRow {
    /// `None` marks a carrier's unmapped bucket.
    agent_id: Option<i64>,
    name: String,
    department: Option<String>,
    category: Option<String>,
    inspector: Option<String>,
    totals: ProductTotals,
    total: f64,
}

fn parse_bound(label: &str, value: &Option<String>) -> Result<Option<Month>, Response> {
    match value {
        Some(s) => Month::parse(s)
            .map(Some)
            .ok_or_else(|| bad_request(&format!("{label}: expected YYYY-MM"))),
        None => Ok(None),
    }
}

fn in_range(month: Month, start: Option<Month>, end: Option<Month>) -> bool {
    start.is_none_or(|s| month >= s) && end.is_none_or(|e| month <= e)
}

/// GET /aggregate/agents: per-agent totals summed over a month range, joined
/// with the agent master data, plus a grand totals line and the retained raw
/// row count for the range. Name, department and inspector filters leave the
/// unmapped buckets out.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<AggregateParams>,
) -> Response {
    let start = match parse_bound("start_month", &params.start_month) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let end = match parse_bound("end_month", &params.end_month) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let context = match &params.ingestion_context {
        Some(s) => match IngestContext::parse(s) {
            Some(c) => c,
            None => return bad_request("ingestion_context: production or elementary"),
        },
        None => IngestContext::Production,
    };

    let store = state.store();
    let agents = match store.agents() {
        Ok(agents) => agents,
        Err(e) => return store_error(e),
    };
    let by_id: BTreeMap<i64, &Agent> = agents.iter().map(|a| (a.id, a)).collect();

    let filter = AggregateFilter {
        carrier_id: params.company_id,
        context: Some(context),
        kind: Some(RowKind::Agent),
        ..Default::default()
    };
    let rows = match store.aggregates(&filter) {
        Ok(rows) => rows,
        Err(e) => return store_error(e),
    };

    let agent_filters_set = params.department.is_some()
        || params.inspector.is_some()
        || params.agent_name.is_some();

    let mut summed: BTreeMap<AgentRef, ProductTotals> = BTreeMap::new();
    for row in rows.iter().filter(|r| in_range(r.month, start, end)) {
        let Some(agent_ref) = row.agent_ref else { continue };
        summed.entry(agent_ref).or_default().add_all(&row.totals);
    }

    let mut out = Vec::new();
    let mut grand = ProductTotals::default();
    for (agent_ref, totals) in &summed {
        let row = match agent_ref {
            AgentRef::Agent { id } => {
                let Some(agent) = by_id.get(id) else { continue };
                let name_ok = params
                    .agent_name
                    .as_deref()
                    .is_none_or(|n| agent.name.contains(n.trim()));
                let dept_ok = params
                    .department
                    .as_deref()
                    .is_none_or(|d| agent.department.as_deref() == Some(d));
                let insp_ok = params
                    .inspector
                    .as_deref()
                    .is_none_or(|i| agent.inspector.as_deref() == Some(i));
                if !(name_ok && dept_ok && insp_ok) {
                    continue;
                }
                AgentTotalsRow {
                    agent_id: Some(*id),
                    name: agent.name.clone(),
                    department: agent.department.clone(),
                    category: agent.category.clone(),
                    inspector: agent.inspector.clone(),
                    totals: *totals,
                    total: totals.total(),
                }
            }
            AgentRef::Unmapped { carrier_id } => {
                if agent_filters_set {
                    continue;
                }
                AgentTotalsRow {
                    agent_id: None,
                    name: format!("UNMAPPED_{carrier_id}"),
                    department: None,
                    category: None,
                    inspector: None,
                    totals: *totals,
                    total: totals.total(),
                }
            }
        };
        grand.add_all(&row.totals);
        out.push(row);
    }

    let batches = match store.batches(Some(context)) {
        Ok(batches) => batches,
        Err(e) => return store_error(e),
    };
    let total_policies: usize = batches
        .iter()
        .filter(|b| {
            params.company_id.is_none_or(|id| b.carrier_id == id)
                && in_range(b.month, start, end)
        })
        .map(|b| b.row_count)
        .sum();

    Json(json!({ "rows": out, "totals": grand, "totalPolicies": total_policies }))
        .into_response()
}
