use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use prodgrid_core::{Month, Product, ProductTotals};
use prodgrid_engine::{achievement, cumulative_schedule, set_percentages};
use prodgrid_store::PercentageTarget;

use crate::api::{bad_request, engine_error, store_error};
use crate::state::AppState;

#[derive(serde::Serialize)]
struct AgentGoals {
    agent_id: i64,
    name: String,
    goals: ProductTotals,
}

/// Every agent joined with its goals for the year, zero-filled where no
/// goal is stored.
fn goals_listing(store: &prodgrid_store::Store, year: i32) -> Result<Vec<AgentGoals>, Response> {
    let agents = store.agents().map_err(store_error)?;
    let goals = store.goals_for_year(year).map_err(store_error)?;
    Ok(agents
        .iter()
        .map(|agent| {
            let mut totals = ProductTotals::default();
            for goal in goals.iter().filter(|g| g.agent_id == agent.id) {
                totals.add(goal.product, goal.amount);
            }
            AgentGoals { agent_id: agent.id, name: agent.name.clone(), goals: totals }
        })
        .collect())
}

/// GET /goals/{year}
pub async fn goals(State(state): State<AppState>, Path(year): Path<i32>) -> Response {
    match goals_listing(&state.store(), year) {
        Ok(listing) => Json(listing).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
pub struct GoalEntry {
    agent_id: i64,
    product: Product,
    amount: f64,
}

/// PUT /goals/{year}: replace the year's goals for every agent named in the
/// body. Agents absent from the body keep their goals.
pub async fn put_goals(
    State(state): State<AppState>,
    Path(year): Path<i32>,
    Json(entries): Json<Vec<GoalEntry>>,
) -> Response {
    if let Some(bad) = entries.iter().find(|e| !(e.amount >= 0.0)) {
        return bad_request(&format!(
            "agent {}, product {}: goal amount must be non-negative",
            bad.agent_id, bad.product
        ));
    }
    let mut per_agent: BTreeMap<i64, Vec<(Product, f64)>> = BTreeMap::new();
    for entry in &entries {
        per_agent.entry(entry.agent_id).or_default().push((entry.product, entry.amount));
    }
    let mut store = state.store();
    for (agent_id, goals) in &per_agent {
        if let Err(e) = store.replace_goals(*agent_id, year, goals) {
            return store_error(e);
        }
    }
    tracing::info!(year, agents = per_agent.len(), "goals replaced");
    match goals_listing(&store, year) {
        Ok(listing) => Json(listing).into_response(),
        Err(resp) => resp,
    }
}

/// GET /targets/percentages/{year}: the company-wide schedule for the year
/// with per-product cumulative sums. A month without its own entry shows a
/// null cumulative.
pub async fn get_percentages(State(state): State<AppState>, Path(year): Path<i32>) -> Response {
    let store = state.store();
    match store.percentages_for_year(year) {
        Ok(targets) => {
            let mut cumulative = serde_json::Map::new();
            for product in Product::ALL {
                cumulative.insert(
                    product.as_str().to_string(),
                    serde_json::json!(cumulative_schedule(&targets, product)),
                );
            }
            Json(serde_json::json!({ "targets": targets, "cumulative": cumulative }))
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

#[derive(Deserialize)]
pub struct PercentageEntry {
    month: u32,
    product: Product,
    percent: f64,
}

/// PUT /targets/percentages/{year}: replace the company-wide monthly
/// percentage schedule for the year. Values outside 0..=100, or a product
/// summing past 100 across the year, reject the whole request.
pub async fn put_percentages(
    State(state): State<AppState>,
    Path(year): Path<i32>,
    Json(entries): Json<Vec<PercentageEntry>>,
) -> Response {
    if let Some(bad) = entries.iter().find(|t| !(1..=12).contains(&t.month)) {
        return bad_request(&format!("month {} outside 1..=12", bad.month));
    }
    let targets: Vec<PercentageTarget> = entries
        .iter()
        .map(|t| PercentageTarget { year, month: t.month, product: t.product, percent: t.percent })
        .collect();
    let mut store = state.store();
    match set_percentages(&mut store, year, &targets) {
        Ok(()) => {
            tracing::info!(year, targets = targets.len(), "percentage targets replaced");
            Json(targets).into_response()
        }
        Err(e) => engine_error(e),
    }
}

/// GET /targets/achievement/{year}/{month}: the monthly achievement report.
pub async fn achievement_report(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Response {
    let Some(month) = Month::new(year, month) else {
        return bad_request("month outside 1..=12");
    };
    match achievement(&state.store(), month) {
        Ok(report) => Json(report).into_response(),
        Err(e) => engine_error(e),
    }
}
