use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

use crate::handlers::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::organizations::create_organization,
        crate::handlers::organizations::update_limit,
        crate::handlers::quota::get_snapshot,
        crate::handlers::quota::check_storage,
        crate::handlers::reservations::create_reservation,
        crate::handlers::reservations::commit_reservation,
        crate::handlers::reservations::cancel_reservation,
        crate::handlers::reservations::sweep_expired,
        crate::handlers::reconciliation::reconcile,
    ),
    components(
        schemas(
            crate::models::QuotaLedger,
            crate::models::QuotaSnapshot,
            crate::models::CreateOrganizationRequest,
            crate::models::UpdateLimitRequest,
            crate::models::CreateReservationRequest,
            crate::models::ReservationResponse,
            crate::models::ResolveResponse,
            crate::models::ReconciliationReport,
            crate::handlers::quota::StorageCheckResponse,
            crate::handlers::reservations::SweepResponse,
        )
    ),
    tags(
        (name = "organizations", description = "Tenant provisioning"),
        (name = "quota", description = "Quota snapshots"),
        (name = "reservations", description = "Reserve, commit and cancel storage"),
        (name = "reconciliation", description = "Ledger audits")
    ),
    info(
        title = "Storage Quota Ledger API",
        version = "1.0.0",
        description = "Per-tenant storage quota reservations with expiry-based leak recovery"
    )
)]
pub struct ApiDoc;

pub fn create_docs_router() -> Router<AppState> {
    Router::new().route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}
