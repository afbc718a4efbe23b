use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use std::{str::FromStr, time::Duration};
use uuid::Uuid;

use super::{from_db_bytes, to_db_bytes, LedgerStore, ObjectIndex};
use crate::errors::{AppError, Result};
use crate::models::{OrganizationRow, QuotaLedger, Reservation, Resolution, ReserveOutcome};

const LEDGER_COLUMNS: &str = "id, used_bytes, reserved_bytes, limit_bytes";
const RESERVATION_COLUMNS: &str = "id, org_id, bytes, user_id, file_key, created_at, expires_at";

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: String,
    org_id: String,
    bytes: i64,
    user_id: Option<String>,
    file_key: Option<String>,
    created_at: i64,
    expires_at: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt reservation id {}: {}", row.id, e)))?;

        Ok(Self {
            id,
            org_id: row.org_id,
            bytes: from_db_bytes(row.bytes),
            user_id: row.user_id,
            file_key: row.file_key,
            created_at: from_millis(row.created_at)?,
            expires_at: from_millis(row.expires_at)?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Timestamp out of range: {}", millis)))
}

/// SQLite ledger for single-node deployments and tests.
///
/// SQLite has no row locks. Every write transaction here starts with a
/// write statement so it takes the database write lock before reading any
/// counter, which serializes all ledger writers.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        // Each connection to `:memory:` is a separate database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_organization(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger> {
        let now = Utc::now().timestamp_millis();

        let row = sqlx::query_as::<_, OrganizationRow>(&format!(
            "INSERT INTO organizations (id, limit_bytes, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING
             RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(org_id)
        .bind(to_db_bytes(limit_bytes)?)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Validation(format!("Organization {} already exists", org_id)))?;

        Ok(row.into())
    }

    async fn find_ledger(&self, org_id: &str) -> Result<Option<QuotaLedger>> {
        let row = sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM organizations WHERE id = ?"
        ))
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_limit(&self, org_id: &str, limit_bytes: u64) -> Result<QuotaLedger> {
        let mut tx = self.pool.begin().await?;

        let mut ledger: QuotaLedger = sqlx::query_as::<_, OrganizationRow>(&format!(
            "UPDATE organizations SET updated_at = ? WHERE id = ? RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(Utc::now().timestamp_millis())
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

        sqlx::query("UPDATE organizations SET limit_bytes = ? WHERE id = ?")
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

        // Touching the row first takes the write lock; concurrent reservers
        // wait on the busy timeout instead of reading a stale `available`.
        let ledger: QuotaLedger = sqlx::query_as::<_, OrganizationRow>(&format!(
            "UPDATE organizations SET updated_at = ? WHERE id = ? RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(reservation.created_at.timestamp_millis())
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

        sqlx::query("UPDATE organizations SET reserved_bytes = reserved_bytes + ? WHERE id = ?")
            .bind(bytes)
            .bind(&reservation.org_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            "INSERT INTO reservations ({RESERVATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(reservation.id.to_string())
        .bind(&reservation.org_id)
        .bind(bytes)
        .bind(&reservation.user_id)
        .bind(&reservation.file_key)
        .bind(reservation.created_at.timestamp_millis())
        .bind(reservation.expires_at.timestamp_millis())
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

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "DELETE FROM reservations WHERE id = ? RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(reservation_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sql = match resolution {
            Resolution::Commit => {
                "UPDATE organizations
                 SET reserved_bytes = reserved_bytes - ?, used_bytes = used_bytes + ?, updated_at = ?
                 WHERE id = ?"
            }
            Resolution::Cancel => {
                "UPDATE organizations
                 SET reserved_bytes = reserved_bytes - ?, updated_at = ?
                 WHERE id = ?"
            }
        };

        let mut query = sqlx::query(sql).bind(row.bytes);
        if resolution == Resolution::Commit {
            query = query.bind(row.bytes);
        }
        query
            .bind(Utc::now().timestamp_millis())
            .bind(&row.org_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(Reservation::try_from(row)?))
    }

    async fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = ?"
        ))
        .bind(reservation_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reservation::try_from).transpose()
    }

    async fn sweep_expired(&self, org_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let swept: Vec<i64> = sqlx::query_scalar(
            "DELETE FROM reservations WHERE org_id = ? AND expires_at <= ? RETURNING bytes",
        )
        .bind(org_id)
        .bind(now.timestamp_millis())
        .fetch_all(&mut *tx)
        .await?;

        let reclaimed: i64 = swept.iter().sum();
        if reclaimed > 0 {
            sqlx::query(
                "UPDATE organizations SET reserved_bytes = reserved_bytes - ?, updated_at = ? WHERE id = ?",
            )
            .bind(reclaimed)
            .bind(now.timestamp_millis())
            .bind(org_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(from_db_bytes(reclaimed))
    }

    async fn orgs_with_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let org_ids = sqlx::query_scalar(
            "SELECT DISTINCT org_id FROM reservations WHERE expires_at <= ? ORDER BY org_id",
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(org_ids)
    }

    async fn reconcile_used(&self, org_id: &str, calculated_used: u64, fix: bool) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let previous: i64 = sqlx::query_scalar(
            "UPDATE organizations SET updated_at = ? WHERE id = ? RETURNING used_bytes",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

        let previous = from_db_bytes(previous);
        if fix && previous != calculated_used {
            sqlx::query("UPDATE organizations SET used_bytes = ? WHERE id = ?")
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
impl ObjectIndex for SqliteLedgerStore {
    async fn live_object_bytes(&self, org_id: &str) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM stored_objects WHERE org_id = ? AND deleted_at IS NULL",
        )
        .bind(org_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(from_db_bytes(total))
    }
}
