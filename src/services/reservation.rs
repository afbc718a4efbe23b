use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    database::LedgerStore,
    errors::{AppError, Result},
    models::{Reservation, ReserveOutcome, Resolution},
    services::metrics::MetricsService,
};

/// Two-phase reserve → commit/cancel protocol over the ledger.
///
/// Upload workflows call [`reserve`](Self::reserve) before sending any bytes
/// to blob storage, then [`commit`](Self::commit) on success or
/// [`cancel`](Self::cancel) on failure. Reservations that are never resolved
/// expire after the TTL and are reclaimed by [`sweep_expired`](Self::sweep_expired).
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn LedgerStore>,
    ttl: Duration,
    metrics: MetricsService,
}

impl ReservationService {
    pub fn new(store: Arc<dyn LedgerStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            metrics: MetricsService::new(),
        }
    }

    /// Claims `bytes` of headroom and returns the reservation handle.
    ///
    /// Fails with [`AppError::QuotaExceeded`] when the organization cannot
    /// fit the request and [`AppError::NotFound`] for an unknown organization.
    pub async fn reserve(
        &self,
        org_id: &str,
        bytes: u64,
        user_id: Option<&str>,
        file_key: Option<&str>,
    ) -> Result<Uuid> {
        self.create_reservation(org_id, bytes, user_id, file_key)
            .await
            .map(|reservation| reservation.id)
    }

    /// Same as [`reserve`](Self::reserve) but returns the full record.
    #[tracing::instrument(skip(self, user_id, file_key))]
    pub async fn create_reservation(
        &self,
        org_id: &str,
        bytes: u64,
        user_id: Option<&str>,
        file_key: Option<&str>,
    ) -> Result<Reservation> {
        if bytes == 0 {
            return Err(AppError::Validation(
                "Reservation size must be greater than zero".to_string(),
            ));
        }

        self.sweep_expired(org_id).await?;

        let reservation = Reservation::new(org_id, bytes, user_id, file_key, Utc::now(), self.ttl);

        match self.store.insert_reservation_if_room(&reservation).await? {
            ReserveOutcome::Reserved => {
                info!(
                    reservation_id = %reservation.id,
                    expires_at = %reservation.expires_at,
                    "Reserved storage"
                );
                self.metrics.record_reservation(bytes);
                Ok(reservation)
            }
            ReserveOutcome::Rejected { available } => {
                warn!(requested = bytes, available, "Storage quota exceeded");
                self.metrics.record_rejection();
                Err(AppError::QuotaExceeded {
                    requested: bytes,
                    available,
                })
            }
        }
    }

    /// Moves the reservation's bytes from reserved to used.
    /// Returns `false` if it was already resolved.
    pub async fn commit(&self, reservation_id: Uuid) -> Result<bool> {
        self.resolve(reservation_id, Resolution::Commit).await
    }

    /// Releases the reservation's bytes. Returns `false` if it was already resolved.
    pub async fn cancel(&self, reservation_id: Uuid) -> Result<bool> {
        self.resolve(reservation_id, Resolution::Cancel).await
    }

    #[tracing::instrument(skip(self))]
    async fn resolve(&self, reservation_id: Uuid, resolution: Resolution) -> Result<bool> {
        match self.store.resolve_reservation(reservation_id, resolution).await? {
            Some(reservation) => {
                info!(
                    org_id = %reservation.org_id,
                    bytes = reservation.bytes,
                    "Reservation resolved"
                );
                self.metrics.record_resolution(resolution, reservation.bytes);
                Ok(true)
            }
            None => {
                debug!("Reservation already resolved");
                self.metrics.record_stale_resolution(resolution);
                Ok(false)
            }
        }
    }

    pub async fn sweep_expired(&self, org_id: &str) -> Result<u64> {
        self.sweep_expired_at(org_id, Utc::now()).await
    }

    /// Reclaims every reservation of `org_id` that has expired as of `now`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_at(&self, org_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let reclaimed = self.store.sweep_expired(org_id, now).await?;

        if reclaimed > 0 {
            info!(bytes_reclaimed = reclaimed, "Swept expired reservations");
            self.metrics.record_sweep(reclaimed);
        }

        Ok(reclaimed)
    }

    pub async fn find(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        self.store.find_reservation(reservation_id).await
    }
}
