//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! every route using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port, no database.

use refinery_advisor::acquisition::SimulatedRefinery;
use refinery_advisor::api::create_app;
use refinery_advisor::applier::ParameterApplier;
use refinery_advisor::optimizer::DecisionHeuristic;
use refinery_advisor::service::DecisionService;
use refinery_advisor::storage::{DecisionStore, InMemoryStore};
use refinery_advisor::types::{ProcessSample, Readings};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    sim: SimulatedRefinery,
    store: Arc<InMemoryStore>,
    app: Router,
}

fn harness() -> Harness {
    let sim = SimulatedRefinery::new();
    let store = Arc::new(InMemoryStore::new());
    let applier = ParameterApplier::new(Arc::new(sim.clone()), Duration::from_secs(1));
    let service = DecisionService::new(
        Arc::clone(&store),
        Arc::new(applier),
        DecisionHeuristic::default(),
    );
    Harness {
        sim,
        store,
        app: create_app(Arc::new(service)),
    }
}

async fn seed_sample(store: &InMemoryStore, bit_tq: f64) {
    let readings = Readings {
        bit_tq: Some(bit_tq),
        ..Readings::fallback_base()
    };
    store
        .insert_sample(&ProcessSample::from_readings(&readings, Utc::now()))
        .await
        .unwrap();
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = call(&h.app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

/// Misses are reported as `success: false` with HTTP 200, never as errors.
#[tokio::test]
async fn test_empty_store_reports_failures_as_200() {
    let h = harness();

    let (status, body) = call(&h.app, "GET", "/api/ai-decisions/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No pending decisions (total: 0, pending: 0)");
    assert!(body.get("data").is_none());

    let (status, body) = call(&h.app, "POST", "/api/ai-decisions/apply").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    let (_, body) = call(&h.app, "POST", "/api/ai-decisions/force-generate").await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No process data available");

    let (_, body) = call(&h.app, "GET", "/api/process/current").await;
    assert_eq!(body["success"], false);
}

/// force-generate → latest → apply → status, the operator workflow end to end.
#[tokio::test]
async fn test_force_generate_then_apply() {
    let h = harness();
    seed_sample(&h.store, 43.0).await;

    let (_, body) = call(&h.app, "POST", "/api/ai-decisions/force-generate").await;
    assert_eq!(body["success"], true, "{body}");
    let forced = &body["data"];
    assert_eq!(forced["decision_type"], "forced_optimization");
    assert_eq!(forced["confidence"], 0.82);
    assert_eq!(forced["predicted_bit_tq"], 52.0);
    assert_eq!(forced["savings_eur_hour"], 185.0);
    assert_eq!(forced["economic_impact"]["monthly_savings_eur"], 133_200.0);

    let (_, body) = call(&h.app, "GET", "/api/ai-decisions/latest").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["timestamp"], forced["timestamp"]);
    assert_eq!(body["data"]["applied"], false);

    let (_, body) = call(&h.app, "POST", "/api/ai-decisions/apply").await;
    assert_eq!(body["success"], true, "{body}");
    assert_eq!(body["data"]["applied_count"], 4);
    assert_eq!(body["data"]["marked_applied"], true);
    assert_eq!(body["data"]["operating_mode"], "ai");
    assert_eq!(body["data"]["simulated"], true);
    assert_eq!(
        body["data"]["field_endpoint"],
        "sim+opc.tcp://localhost:4840/refinery"
    );
    assert_eq!(h.sim.value("operator_mode"), Some(1.0));

    let (_, body) = call(&h.app, "GET", "/api/status").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_samples"], 1);
    assert_eq!(body["data"]["total_decisions"], 1);
    assert_eq!(body["data"]["pending_decisions"], 0);
    assert_eq!(body["data"]["latest_bit_tq"], 43.0);
    assert_eq!(body["data"]["store_backend"], "InMemory");

    let (_, body) = call(&h.app, "GET", "/api/ai-decisions/latest").await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No pending decisions (total: 1, pending: 0)");
}

#[tokio::test]
async fn test_apply_with_failing_field_keeps_decision_pending() {
    let h = harness();
    seed_sample(&h.store, 43.0).await;
    call(&h.app, "POST", "/api/ai-decisions/force-generate").await;

    h.sim.set_reachable(false);
    let (status, body) = call(&h.app, "POST", "/api/ai-decisions/apply").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["applied_count"], 0);
    assert_eq!(body["data"]["marked_applied"], false);

    let (_, body) = call(&h.app, "GET", "/api/ai-decisions/latest").await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_reset_restores_baseline() {
    let h = harness();
    h.sim.set_value("fc1065", 133.0);
    h.sim.set_value("operator_mode", 1.0);

    let (_, body) = call(&h.app, "POST", "/api/process/reset").await;
    assert_eq!(body["success"], true, "{body}");
    assert_eq!(body["data"]["operating_mode"], "human");
    assert_eq!(body["data"]["applied_count"], 4);
    assert_eq!(body["data"]["simulated"], true);
    assert_eq!(h.sim.value("fc1065"), Some(127.3));
    assert_eq!(h.sim.value("operator_mode"), Some(0.0));
}

#[tokio::test]
async fn test_current_process_returns_latest_sample() {
    let h = harness();
    seed_sample(&h.store, 47.5).await;

    let (_, body) = call(&h.app, "GET", "/api/process/current").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["bit_tq"], 47.5);
    assert_eq!(body["data"]["data_source"], "human_control");
}

#[tokio::test]
async fn test_store_outage_is_reported() {
    let h = harness();
    h.store.set_available(false);

    let (status, body) = call(&h.app, "GET", "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to count records"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = harness();
    let (status, _) = call(&h.app, "GET", "/api/ai-decisions/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
