use std::sync::Arc;

use crate::{
    database::LedgerStore,
    errors::{AppError, Result},
    models::QuotaSnapshot,
    services::reservation::ReservationService,
};

/// Read-only quota views. Expired reservations are swept before every read
/// so the figures never include abandoned claims.
#[derive(Clone)]
pub struct QuotaQueryService {
    store: Arc<dyn LedgerStore>,
    reservations: ReservationService,
}

impl QuotaQueryService {
    pub fn new(store: Arc<dyn LedgerStore>, reservations: ReservationService) -> Self {
        Self {
            store,
            reservations,
        }
    }

    pub async fn snapshot(&self, org_id: &str) -> Result<QuotaSnapshot> {
        self.reservations.sweep_expired(org_id).await?;

        let ledger = self
            .store
            .find_ledger(org_id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(ledger.into())
    }

    /// Advisory only: the answer can be stale by the time the caller acts on
    /// it. Uploads still have to go through `reserve`.
    pub async fn has_available_storage(&self, org_id: &str, bytes: u64) -> Result<bool> {
        let snapshot = self.snapshot(org_id).await?;
        Ok(bytes <= snapshot.available_bytes)
    }
}
