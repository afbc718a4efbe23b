use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use crate::{
    errors::Result,
    handlers::AppState,
    models::{ReconcileQuery, ReconciliationReport},
};

#[utoipa::path(
    post,
    path = "/api/v1/organizations/{org_id}/reconcile",
    params(
        ("org_id" = String, Path, description = "Organization identifier"),
        ReconcileQuery
    ),
    responses(
        (status = 200, description = "Reconciliation report", body = ReconciliationReport),
        (status = 404, description = "Unknown organization")
    ),
    tag = "reconciliation"
)]
pub async fn reconcile(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconciliationReport>> {
    Ok(Json(state.reconciliation.reconcile(&org_id, query.fix).await?))
}
