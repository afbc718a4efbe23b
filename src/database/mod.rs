use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{QuotaLedger, Reservation, Resolution, ReserveOutcome};

pub mod postgres;
pub mod sqlite;

pub use postgres::PgLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Transactional access to the organization counters and reservation rows.
///
/// Every mutating method runs as one database transaction and takes the
/// organization's row lock (or the database write lock on SQLite) before it
/// reads any counter. Locks are always taken organization first, then
/// reservation rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn migrate(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    /// Returns `Validation` if the id is already taken.
    async fn create_organization(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger>;

    async fn find_ledger(&self, org_id: &str) -> Result<Option<QuotaLedger>>;

    /// Rejects a limit below the organization's committed plus reserved bytes.
    async fn update_limit(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger>;

    /// Locks the organization, checks headroom and, if there is room, bumps
    /// `reserved_bytes` and inserts the reservation row.
    async fn insert_reservation_if_room(&self, reservation: &Reservation) -> Result<ReserveOutcome>;

    /// Deletes the reservation and applies `resolution` to the counters.
    /// `None` if the reservation no longer exists.
    async fn resolve_reservation(
        &self,
        reservation_id: Uuid,
        resolution: Resolution,
    ) -> Result<Option<Reservation>>;

    async fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>>;

    /// Deletes reservations with `expires_at <= now` and releases their
    /// bytes in a single counter update. Returns the bytes reclaimed.
    async fn sweep_expired(&self, org_id: &str, now: DateTime<Utc>) -> Result<u64>;

    async fn orgs_with_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Reads `used_bytes` under the row lock and, when `fix` is set and it
    /// differs, overwrites it with `calculated_used`. Returns the previous value.
    async fn reconcile_used(&self, org_id: &str, calculated_used: u64, fix: bool) -> Result<u64>;
}

/// Read-only view of the document-storage subsystem's live objects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectIndex: Send + Sync {
    /// Sum of sizes of all non-deleted objects owned by the organization.
    async fn live_object_bytes(&self, org_id: &str) -> Result<u64>;
}

#[derive(Clone)]
pub struct Database {
    ledger: Arc<dyn LedgerStore>,
    objects: Arc<dyn ObjectIndex>,
}

impl Database {
    /// Picks the backend from the URL scheme.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let store = Arc::new(PgLedgerStore::new(database_url, max_connections).await?);
            Ok(Self::with_stores(store.clone(), store))
        } else if database_url.starts_with("sqlite:") {
            let store = Arc::new(SqliteLedgerStore::new(database_url, max_connections).await?);
            Ok(Self::with_stores(store.clone(), store))
        } else {
            Err(AppError::Validation(format!(
                "Unsupported database URL scheme: {}",
                database_url.split(':').next().unwrap_or_default()
            )))
        }
    }

    pub fn with_stores(ledger: Arc<dyn LedgerStore>, objects: Arc<dyn ObjectIndex>) -> Self {
        Self { ledger, objects }
    }

    pub async fn migrate(&self) -> Result<()> {
        self.ledger.migrate().await
    }

    pub fn ledger(&self) -> Arc<dyn LedgerStore> {
        self.ledger.clone()
    }

    pub fn objects(&self) -> Arc<dyn ObjectIndex> {
        self.objects.clone()
    }
}

pub(crate) fn to_db_bytes(bytes: u64) -> Result<i64> {
    i64::try_from(bytes).map_err(|_| {
        AppError::Validation(format!("Byte count {} exceeds the supported range", bytes))
    })
}

pub(crate) fn from_db_bytes(bytes: i64) -> u64 {
    bytes.max(0) as u64
}
