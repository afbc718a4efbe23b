use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::Result,
    handlers::AppState,
    models::{CreateReservationRequest, ReservationResponse, ResolveResponse},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    pub org_id: String,
    pub bytes_reclaimed: u64,
}

#[utoipa::path(
    post,
    path = "/api/v1/organizations/{org_id}/reservations",
    params(("org_id" = String, Path, description = "Organization identifier")),
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Storage reserved", body = ReservationResponse),
        (status = 400, description = "Invalid reservation size"),
        (status = 404, description = "Unknown organization"),
        (status = 507, description = "Insufficient storage")
    ),
    tag = "reservations"
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>)> {
    let reservation = state
        .reservations
        .create_reservation(
            &org_id,
            request.bytes,
            request.user_id.as_deref(),
            request.file_key.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/reservations/{reservation_id}/commit",
    params(("reservation_id" = Uuid, Path, description = "Reservation handle")),
    responses((status = 200, description = "Commit applied or already resolved", body = ResolveResponse)),
    tag = "reservations"
)]
pub async fn commit_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<ResolveResponse>> {
    let resolved = state.reservations.commit(reservation_id).await?;

    Ok(Json(ResolveResponse {
        reservation_id,
        resolved,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/reservations/{reservation_id}/cancel",
    params(("reservation_id" = Uuid, Path, description = "Reservation handle")),
    responses((status = 200, description = "Cancel applied or already resolved", body = ResolveResponse)),
    tag = "reservations"
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<ResolveResponse>> {
    let resolved = state.reservations.cancel(reservation_id).await?;

    Ok(Json(ResolveResponse {
        reservation_id,
        resolved,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/organizations/{org_id}/sweep",
    params(("org_id" = String, Path, description = "Organization identifier")),
    responses((status = 200, description = "Expired reservations reclaimed", body = SweepResponse)),
    tag = "reservations"
)]
pub async fn sweep_expired(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<SweepResponse>> {
    let bytes_reclaimed = state.reservations.sweep_expired(&org_id).await?;

    Ok(Json(SweepResponse {
        org_id,
        bytes_reclaimed,
    }))
}
