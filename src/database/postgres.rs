use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use super::{from_db_bytes, to_db_bytes, LedgerStore, ObjectIndex};
use crate::errors::{AppError, Result};
use crate::models::{OrganizationRow, QuotaLedger, Reservation, Resolution, ReserveOutcome};

const LEDGER_COLUMNS: &str = "id, used_bytes, reserved_bytes, limit_bytes";
const RESERVATION_COLUMNS: &str = "id, org_id, bytes, user_id, file_key, created_at, expires_at";

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    org_id: String,
    bytes: i64,
    user_id: Option<String>,
    file_key: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            bytes: from_db_bytes(row.bytes),
            user_id: row.user_id,
            file_key: row.file_key,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// PostgreSQL ledger. Serializes per-organization writers with
/// `SELECT ... FOR UPDATE` on the organization row, so it is safe across
/// any number of replicas sharing the database.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres").run(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_organization(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger> {
        let row = sqlx::query_as::<_, OrganizationRow>(&format!(
            "INSERT INTO organizations (id, limit_bytes) VALUES ($1, $2)
             ON CONFLICT (id) DO NOTHING
             RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(org_id)
        .bind(to_db_bytes(limit_bytes)?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Validation(format!("Organization {} already exists", org_id)))?;

        Ok(row.into())
    }

    async fn find_ledger(&self, org_id: &str) -> Result<Option<QuotaLedger>> {
        let row = sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_limit(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger> {
        let mut tx = self.pool.begin().await?;

        let mut ledger: QuotaLedger = sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM organizations WHERE id = $1 FOR UPDATE"
        ))
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?
        .into();

        if limit_bytes < ledger.claimed_bytes() {
            return Err(AppError::Validation(format!(
                "Limit {} is below current usage of {} bytes",
                limit_bytes,
                ledger.claimed_bytes()
            )));
        }

        sqlx::query("UPDATE organizations SET limit_bytes = $1, updated_at = NOW() WHERE id = $2")
            .bind(to_db_bytes(limit_bytes)?)
            .bind(org_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        ledger.limit_bytes = limit_bytes;
        Ok(ledger)
    }

    async fn insert_reservation_if_room(&self, reservation: &Reservation) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        // Concurrent reservers for the same organization queue here.
        let ledger: QuotaLedger = sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM organizations WHERE id = $1 FOR UPDATE"
        ))
        .bind(&reservation.org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?
        .into();

        if !ledger.can_reserve(reservation.bytes) {
            tx.rollback().await?;
            return Ok(ReserveOutcome::Rejected {
                available: ledger.available_bytes(),
            });
        }

        let bytes = to_db_bytes(reservation.bytes)?;

        sqlx::query(
            "UPDATE organizations SET reserved_bytes = reserved_bytes + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(bytes)
        .bind(&reservation.org_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO reservations ({RESERVATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(reservation.id)
        .bind(&reservation.org_id)
        .bind(bytes)
        .bind(&reservation.user_id)
        .bind(&reservation.file_key)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved)
    }

    async fn resolve_reservation(
        &self,
        reservation_id: Uuid,
        resolution: Resolution,
    ) -> Result<Option<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let org_id: Option<String> =
            sqlx::query_scalar("SELECT org_id FROM reservations WHERE id = $1")
                .bind(reservation_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(org_id) = org_id else {
            return Ok(None);
        };

        sqlx::query("SELECT id FROM organizations WHERE id = $1 FOR UPDATE")
            .bind(&org_id)
            .execute(&mut *tx)
            .await?;

        // Re-evaluated after the lock wait: a concurrent commit, cancel or
        // sweep that got there first leaves nothing to delete.
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "DELETE FROM reservations WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sql = match resolution {
            Resolution::Commit => {
                "UPDATE organizations
                 SET reserved_bytes = reserved_bytes - $1, used_bytes = used_bytes + $1, updated_at = NOW()
                 WHERE id = $2"
            }
            Resolution::Cancel => {
                "UPDATE organizations
                 SET reserved_bytes = reserved_bytes - $1, updated_at = NOW()
                 WHERE id = $2"
            }
        };

        sqlx::query(sql)
            .bind(row.bytes)
            .bind(&row.org_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn sweep_expired(&self, org_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<String> =
            sqlx::query_scalar("SELECT id FROM organizations WHERE id = $1 FOR UPDATE")
                .bind(org_id)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            return Ok(0);
        }

        let swept: Vec<i64> = sqlx::query_scalar(
            "DELETE FROM reservations WHERE org_id = $1 AND expires_at <= $2 RETURNING bytes",
        )
        .bind(org_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let reclaimed: i64 = swept.iter().sum();
        if reclaimed > 0 {
            sqlx::query(
                "UPDATE organizations SET reserved_bytes = reserved_bytes - $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(reclaimed)
            .bind(org_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(from_db_bytes(reclaimed))
    }

    async fn orgs_with_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let org_ids = sqlx::query_scalar(
            "SELECT DISTINCT org_id FROM reservations WHERE expires_at <= $1 ORDER BY org_id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(org_ids)
    }

    async fn reconcile_used(&self, org_id: &str, calculated_used: u64, fix: bool) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let previous: i64 =
            sqlx::query_scalar("SELECT used_bytes FROM organizations WHERE id = $1 FOR UPDATE")
                .bind(org_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AppError::NotFound)?;

        let previous = from_db_bytes(previous);
        if fix && previous != calculated_used {
            sqlx::query("UPDATE organizations SET used_bytes = $1, updated_at = NOW() WHERE id = $2")
                .bind(to_db_bytes(calculated_used)?)
                .bind(org_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(previous)
    }
}

#[async_trait]
impl ObjectIndex for PgLedgerStore {
    async fn live_object_bytes(&self, org_id: &str) -> Result<u64> {
        // SUM over BIGINT yields NUMERIC
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM stored_objects WHERE org_id = $1 AND deleted_at IS NULL",
        )
        .bind(org_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(from_db_bytes(total))
    }
}
