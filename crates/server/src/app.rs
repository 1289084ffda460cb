use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::api::{agents, aggregate, targets, upload};
use crate::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload::upload_file))
        .route("/upload/records", get(upload::list_batches).delete(upload::delete_batch))
        .route("/upload/upload-direct-agents", post(upload::upload_direct))
        .route("/upload/unmapped", get(upload::unmapped))
        .route("/agents", get(agents::list).post(agents::create))
        .route(
            "/agents/:id",
            get(agents::get_one).put(agents::update).delete(agents::remove),
        )
        .route("/companies", get(agents::companies))
        .route("/aggregate/agents", get(aggregate::query))
        .route("/goals/:year", get(targets::goals).put(targets::put_goals))
        .route(
            "/targets/percentages/:year",
            get(targets::get_percentages).put(targets::put_percentages),
        )
        .route("/targets/achievement/:year/:month", get(targets::achievement_report))
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use prodgrid_schema::SchemaRegistry;
    use prodgrid_store::Store;
    use serde_json::Value;
    use tower::util::ServiceExt;

    const REGISTRY: &str = r#"
[[carrier]]
id = 7
name = "C7"
aliases = ["הראל"]

[[carrier.production.slot]]
label = "policies"
header_hint = "Policies"
agent_column = "Agent No"

[carrier.production.slot.rule]
type = "single"
column = "Premium"
product = "risk"
"#;

    fn test_app() -> Router {
        let registry = SchemaRegistry::from_toml(REGISTRY).unwrap();
        let store = Store::open_in_memory().unwrap();
        build_app(AppState::new(store, registry))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_responds() {
        let response = test_app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn companies_reflect_registry() {
        let response = test_app().oneshot(get("/companies")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let companies = body_json(response).await;
        assert_eq!(companies[0]["id"], 7);
        assert_eq!(companies[0]["production"], true);
        assert_eq!(companies[0]["elementary"], false);
    }

    #[tokio::test]
    async fn agent_crud_roundtrip() {
        let app = test_app();
        let agent = serde_json::json!({
            "id": 1,
            "name": "Agent One",
            "department": "North",
            "category": null,
            "inspector": null,
            "status": "active",
            "idents": { "production": { "7": "1001" } },
        });

        let response =
            app.clone().oneshot(json_request("POST", "/agents", agent)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let saved = body_json(response).await;
        assert_eq!(saved["reAggregation"]["lifeInsurance"]["monthsReAggregated"], 0);
        assert_eq!(saved["reAggregation"]["elementary"]["aggregationsDeleted"], 0);

        let response = app.clone().oneshot(get("/agents/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "Agent One");

        let response = app.clone().oneshot(get("/agents/2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(Request::builder().method("DELETE").uri("/agents/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/agents/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn percentage_overflow_is_rejected() {
        let app = test_app();
        let targets: Vec<Value> = (1..=12)
            .map(|m| serde_json::json!({ "month": m, "product": "risk", "percent": 9.0 }))
            .collect();
        let response = app
            .oneshot(json_request("PUT", "/targets/percentages/2024", Value::Array(targets)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await;
        assert!(error["error"].as_str().unwrap().contains("over 100"));
    }

    #[tokio::test]
    async fn goals_and_achievement_flow() {
        let app = test_app();
        let agent = serde_json::json!({
            "id": 1,
            "name": "Agent One",
            "department": null,
            "category": null,
            "inspector": null,
            "status": "active",
            "idents": {},
        });
        app.clone().oneshot(json_request("POST", "/agents", agent)).await.unwrap();

        let goals = serde_json::json!([{ "agent_id": 1, "product": "risk", "amount": 1200.0 }]);
        let response =
            app.clone().oneshot(json_request("PUT", "/goals/2024", goals)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listing = body_json(response).await;
        assert_eq!(listing[0]["goals"]["risk"], 1200.0);
        assert_eq!(listing[0]["goals"]["pension"], 0.0, "missing goals are zero-filled");

        let body = serde_json::json!([{ "month": 3, "product": "risk", "percent": 10.0 }]);
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/targets/percentages/2024", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            app.clone().oneshot(get("/targets/percentages/2024")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let schedule = body_json(response).await;
        assert_eq!(schedule["targets"][0]["percent"], 10.0);
        assert_eq!(schedule["cumulative"]["risk"][2], 10.0);
        assert!(schedule["cumulative"]["risk"][1].is_null());

        let response =
            app.oneshot(get("/targets/achievement/2024/3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        let risk = &report["agents"][0]["products"][1];
        assert_eq!(risk["product"], "risk");
        assert_eq!(risk["target"], 120.0);
        assert_eq!(risk["achievement"], 0.0);
        assert_eq!(report["grand"]["target_total"], 120.0);
    }

    #[tokio::test]
    async fn malformed_month_is_rejected() {
        let response = test_app()
            .oneshot(get("/aggregate/agents?start_month=202403"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
