//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::jobs::QueryWorker;
use crate::kernel::PipelineDeps;
use crate::server::routes::{create_run_handler, get_run_handler, health_handler, worker_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: PipelineDeps,
    pub worker: Arc<QueryWorker>,
    /// Absent when running against in-memory stores
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(deps: PipelineDeps, worker: Arc<QueryWorker>, db_pool: Option<PgPool>) -> Self {
        Self {
            deps,
            worker,
            db_pool,
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    // CORS configuration - allow any origin, the API carries no credentials
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/runs", post(create_run_handler))
        .route("/runs/:id", get(get_run_handler))
        .route("/worker", post(worker_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
