//! REST API module using Axum
//!
//! A thin layer over [`DecisionService`](crate::service::DecisionService).
//! Operation failures come back as HTTP 200 with `success: false`.

pub mod handlers;
mod routes;

pub use routes::api_routes;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::acquisition::FieldEndpoint;
use crate::service::DecisionService;
use crate::storage::DecisionStore;

/// Full application router: API routes with CORS and request tracing.
pub fn create_app<E, S>(service: Arc<DecisionService<E, S>>) -> Router
where
    E: FieldEndpoint,
    S: DecisionStore + ?Sized + 'static,
{
    api_routes(service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
