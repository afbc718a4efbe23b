//! Storage quota reservation ledger.
//!
//! Tracks per-organization `used`, `reserved` and `limit` byte counters and
//! hands out time-boxed reservations against the remaining headroom:
//!
//! 1. [`ReservationService::reserve`](services::ReservationService::reserve)
//!    before any bytes reach blob storage;
//! 2. [`commit`](services::ReservationService::commit) once the upload
//!    landed, or [`cancel`](services::ReservationService::cancel) if it failed;
//! 3. reservations that are never resolved expire and are swept back.
//!
//! All counters live in the database and are only changed inside
//! transactions that hold the organization's row lock.

use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use crate::{config::Config, database::Database, handlers::AppState};

pub fn create_app(database: Database, config: Config, prometheus: PrometheusHandle) -> Router {
    let state = AppState::new(database, config, prometheus);
    create_router(state)
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/organizations",
            post(handlers::organizations::create_organization),
        )
        .route(
            "/organizations/:org_id/limit",
            put(handlers::organizations::update_limit),
        )
        .route("/organizations/:org_id/quota", get(handlers::quota::get_snapshot))
        .route(
            "/organizations/:org_id/quota/check",
            get(handlers::quota::check_storage),
        )
        .route(
            "/organizations/:org_id/reservations",
            post(handlers::reservations::create_reservation),
        )
        .route(
            "/organizations/:org_id/sweep",
            post(handlers::reservations::sweep_expired),
        )
        .route(
            "/organizations/:org_id/reconcile",
            post(handlers::reconciliation::reconcile),
        )
        .route(
            "/reservations/:reservation_id/commit",
            post(handlers::reservations::commit_reservation),
        )
        .route(
            "/reservations/:reservation_id/cancel",
            post(handlers::reservations::cancel_reservation),
        );

    Router::new()
        .nest("/api/v1", api)
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .merge(handlers::docs::create_docs_router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
