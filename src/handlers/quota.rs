use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{errors::Result, handlers::AppState, models::QuotaSnapshot};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StorageCheckQuery {
    pub bytes: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageCheckResponse {
    pub bytes: u64,
    /// Advisory; a reservation is still required before uploading.
    pub available: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/organizations/{org_id}/quota",
    params(("org_id" = String, Path, description = "Organization identifier")),
    responses(
        (status = 200, description = "Current quota usage", body = QuotaSnapshot),
        (status = 404, description = "Unknown organization")
    ),
    tag = "quota"
)]
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<QuotaSnapshot>> {
    Ok(Json(state.quota.snapshot(&org_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/organizations/{org_id}/quota/check",
    params(
        ("org_id" = String, Path, description = "Organization identifier"),
        StorageCheckQuery
    ),
    responses(
        (status = 200, description = "Whether the bytes currently fit", body = StorageCheckResponse),
        (status = 404, description = "Unknown organization")
    ),
    tag = "quota"
)]
pub async fn check_storage(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Query(query): Query<StorageCheckQuery>,
) -> Result<Json<StorageCheckResponse>> {
    let available = state
        .quota
        .has_available_storage(&org_id, query.bytes)
        .await?;

    Ok(Json(StorageCheckResponse {
        bytes: query.bytes,
        available,
    }))
}
