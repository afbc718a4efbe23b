#![allow(dead_code)]

use chrono::Duration;
use quota_ledger::{
    database::{Database, LedgerStore, SqliteLedgerStore},
    services::{QuotaQueryService, ReconciliationService, ReservationService},
};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestLedger {
    // Keeps the database file alive for the duration of the test.
    pub dir: TempDir,
    pub store: Arc<SqliteLedgerStore>,
    pub database: Database,
    pub reservations: ReservationService,
    pub quota: QuotaQueryService,
    pub reconciliation: ReconciliationService,
}

pub const TTL_MINUTES: i64 = 30;

pub async fn setup_test_ledger() -> TestLedger {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    let store = Arc::new(
        SqliteLedgerStore::new(&url, 8)
            .await
            .expect("Failed to open test database"),
    );
    store.migrate().await.expect("Failed to run migrations");

    let database = Database::with_stores(store.clone(), store.clone());
    let reservations = ReservationService::new(database.ledger(), Duration::minutes(TTL_MINUTES));
    let quota = QuotaQueryService::new(database.ledger(), reservations.clone());
    let reconciliation = ReconciliationService::new(database.ledger(), database.objects());

    TestLedger {
        dir,
        store,
        database,
        reservations,
        quota,
        reconciliation,
    }
}

impl TestLedger {
    pub async fn create_org(&self, org_id: &str, limit_bytes: u64) {
        self.store
            .create_organization(org_id, limit_bytes)
            .await
            .expect("Failed to create organization");
    }

    pub async fn add_stored_object(&self, org_id: &str, key: &str, size: i64, deleted: bool) {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO stored_objects (org_id, object_key, size_bytes, created_at, deleted_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(org_id)
        .bind(key)
        .bind(size)
        .bind(now)
        .bind(deleted.then_some(now))
        .execute(self.store.pool())
        .await
        .expect("Failed to insert stored object");
    }

    pub async fn set_used_bytes(&self, org_id: &str, used: i64) {
        sqlx::query("UPDATE organizations SET used_bytes = ? WHERE id = ?")
            .bind(used)
            .bind(org_id)
            .execute(self.store.pool())
            .await
            .expect("Failed to set used bytes");
    }

    pub async fn reservation_count(&self, org_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE org_id = ?")
            .bind(org_id)
            .fetch_one(self.store.pool())
            .await
            .expect("Failed to count reservations")
    }

    /// Asserts the ledger invariants for `org_id`.
    pub async fn assert_invariants(&self, org_id: &str) {
        let ledger = self
            .store
            .find_ledger(org_id)
            .await
            .unwrap()
            .expect("organization exists");
        assert!(
            ledger.used_bytes + ledger.reserved_bytes <= ledger.limit_bytes,
            "used {} + reserved {} exceeds limit {}",
            ledger.used_bytes,
            ledger.reserved_bytes,
            ledger.limit_bytes
        );

        let outstanding: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(bytes), 0) FROM reservations WHERE org_id = ?",
        )
        .bind(org_id)
        .fetch_one(self.store.pool())
        .await
        .unwrap();
        assert_eq!(ledger.reserved_bytes, outstanding as u64);
    }
}
