use std::sync::Arc;
use tracing::info;

use crate::{
    database::LedgerStore,
    errors::{AppError, Result},
    models::QuotaLedger,
};

#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn LedgerStore>,
    default_limit_bytes: u64,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn LedgerStore>, default_limit_bytes: u64) -> Self {
        Self {
            store,
            default_limit_bytes,
        }
    }

    pub async fn create(&self, org_id: &str, limit_bytes: Option<u64>) -> Result<QuotaLedger> {
        let org_id = org_id.trim();
        if org_id.is_empty() {
            return Err(AppError::Validation(
                "Organization id must not be empty".to_string(),
            ));
        }

        let limit_bytes = limit_bytes.unwrap_or(self.default_limit_bytes);
        let ledger = self.store.create_organization(org_id, limit_bytes).await?;

        info!(org_id = %ledger.org_id, limit_bytes, "Organization provisioned");
        Ok(ledger)
    }

    pub async fn get(&self, org_id: &str) -> Result<QuotaLedger> {
        self.store
            .find_ledger(org_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn set_limit(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger> {
        let ledger = self.store.update_limit(org_id, limit_bytes).await?;

        info!(org_id = %org_id, limit_bytes, "Storage limit updated");
        Ok(ledger)
    }
}
