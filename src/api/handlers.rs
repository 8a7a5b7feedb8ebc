//! HTTP handlers
//!
//! Each handler forwards to one [`DecisionService`] operation and returns its
//! [`OperationResult`] as JSON with status 200, including failures.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::acquisition::FieldEndpoint;
use crate::service::{
    ApplyResult, DecisionService, DecisionView, OperationResult, ResetResult, StatusReport,
};
use crate::storage::DecisionStore;
use crate::types::ProcessSample;

/// Shared handler state.
pub type ServiceState<E, S> = State<Arc<DecisionService<E, S>>>;

/// GET /api/ai-decisions/latest
pub async fn latest_decision<E, S>(
    State(service): ServiceState<E, S>,
) -> Json<OperationResult<DecisionView>>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Json(service.latest_decision().await)
}

/// POST /api/ai-decisions/apply
pub async fn apply_decision<E, S>(
    State(service): ServiceState<E, S>,
) -> Json<OperationResult<ApplyResult>>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Json(service.apply_latest().await)
}

/// POST /api/ai-decisions/force-generate
pub async fn force_generate<E, S>(
    State(service): ServiceState<E, S>,
) -> Json<OperationResult<DecisionView>>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Json(service.force_generate().await)
}

/// GET /api/process/current
pub async fn current_process<E, S>(
    State(service): ServiceState<E, S>,
) -> Json<OperationResult<ProcessSample>>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Json(service.current_process().await)
}

/// POST /api/process/reset
pub async fn reset_process<E, S>(
    State(service): ServiceState<E, S>,
) -> Json<OperationResult<ResetResult>>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Json(service.reset_to_baseline().await)
}

/// GET /api/status
pub async fn status<E, S>(State(service): ServiceState<E, S>) -> Json<OperationResult<StatusReport>>
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Json(service.status().await)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}
