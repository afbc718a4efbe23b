use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    errors::Result,
    handlers::AppState,
    models::{CreateOrganizationRequest, QuotaLedger, UpdateLimitRequest},
};

#[utoipa::path(
    post,
    path = "/api/v1/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization provisioned", body = QuotaLedger),
        (status = 400, description = "Invalid or duplicate organization id")
    ),
    tag = "organizations"
)]
pub async fn create_organization(
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<QuotaLedger>)> {
    let ledger = state
        .organizations
        .create(&request.id, request.limit_bytes)
        .await?;

    Ok((StatusCode::CREATED, Json(ledger)))
}

#[utoipa::path(
    put,
    path = "/api/v1/organizations/{org_id}/limit",
    params(("org_id" = String, Path, description = "Organization identifier")),
    request_body = UpdateLimitRequest,
    responses(
        (status = 200, description = "Limit updated", body = QuotaLedger),
        (status = 400, description = "Limit below current usage"),
        (status = 404, description = "Unknown organization")
    ),
    tag = "organizations"
)]
pub async fn update_limit(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Json(request): Json<UpdateLimitRequest>,
) -> Result<Json<QuotaLedger>> {
    let ledger = state
        .organizations
        .set_limit(&org_id, request.limit_bytes)
        .await?;

    Ok(Json(ledger))
}
