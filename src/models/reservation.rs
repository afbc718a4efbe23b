use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// An in-flight claim against an organization's headroom.
///
/// Rows are only ever inserted and deleted; a missing row means the claim
/// was already committed, cancelled or swept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    pub id: Uuid,
    pub org_id: String,
    pub bytes: u64,
    pub user_id: Option<String>,
    pub file_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        org_id: &str,
        bytes: u64,
        user_id: Option<&str>,
        file_key: Option<&str>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            bytes,
            user_id: user_id.map(str::to_string),
            file_key: file_key.map(str::to_string),
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

/// How a reservation leaves the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Bytes move from reserved to used.
    Commit,
    /// Bytes are released.
    Cancel,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Commit => "commit",
            Resolution::Cancel => "cancel",
        }
    }
}

/// Result of the locked check-and-insert step of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Rejected { available: u64 },
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReservationRequest {
    pub bytes: u64,
    pub user_id: Option<String>,
    pub file_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub org_id: String,
    pub bytes: u64,
    pub expires_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            reservation_id: reservation.id,
            org_id: reservation.org_id,
            bytes: reservation.bytes,
            expires_at: reservation.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub reservation_id: Uuid,
    /// `false` when the reservation had already been resolved.
    pub resolved: bool,
}
