use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    database::{LedgerStore, ObjectIndex},
    errors::{AppError, Result},
    models::ReconciliationReport,
    services::metrics::MetricsService,
};

/// Audits the ledger's `used_bytes` against the live-object index.
///
/// Drift in `reserved_bytes` is bounded by reservation expiry, so this only
/// ever looks at (and optionally rewrites) committed usage.
#[derive(Clone)]
pub struct ReconciliationService {
    store: Arc<dyn LedgerStore>,
    objects: Arc<dyn ObjectIndex>,
    metrics: MetricsService,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn LedgerStore>, objects: Arc<dyn ObjectIndex>) -> Self {
        Self {
            store,
            objects,
            metrics: MetricsService::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, org_id: &str, fix: bool) -> Result<ReconciliationReport> {
        if self.store.find_ledger(org_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let calculated_used = self.objects.live_object_bytes(org_id).await?;
        let previous_used = self.store.reconcile_used(org_id, calculated_used, fix).await?;

        let deviation = i64::try_from(previous_used as i128 - calculated_used as i128)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Deviation out of range")))?;
        let corrected = fix && deviation != 0;

        if deviation != 0 {
            warn!(previous_used, calculated_used, deviation, corrected, "Ledger usage drift detected");
        } else {
            info!(previous_used, "Ledger usage matches stored objects");
        }
        self.metrics.record_deviation(org_id, deviation);

        Ok(ReconciliationReport {
            org_id: org_id.to_string(),
            previous_used,
            calculated_used,
            deviation,
            corrected,
        })
    }
}
