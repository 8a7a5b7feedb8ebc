//! API route definitions
//!
//! - GET  /api/ai-decisions/latest          latest pending decision
//! - POST /api/ai-decisions/apply           apply it and mark it applied
//! - POST /api/ai-decisions/force-generate  synthesize one from the latest sample
//! - GET  /api/process/current              latest process sample
//! - POST /api/process/reset                baseline parameters, human control
//! - GET  /api/status                       counts and latest quality
//! - GET  /health                           liveness

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use super::handlers;
use crate::acquisition::FieldEndpoint;
use crate::service::DecisionService;
use crate::storage::DecisionStore;

/// Create all API routes.
pub fn api_routes<E, S>(service: Arc<DecisionService<E, S>>) -> Router
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    Router::new()
        .route("/api/ai-decisions/latest", get(handlers::latest_decision::<E, S>))
        .route("/api/ai-decisions/apply", post(handlers::apply_decision::<E, S>))
        .route(
            "/api/ai-decisions/force-generate",
            post(handlers::force_generate::<E, S>),
        )
        .route("/api/process/current", get(handlers::current_process::<E, S>))
        .route("/api/process/reset", post(handlers::reset_process::<E, S>))
        .route("/api/status", get(handlers::status::<E, S>))
        .route("/health", get(handlers::health))
        .with_state(service)
}
