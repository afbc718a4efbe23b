use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Raw `organizations` row. Counters are stored as signed BIGINT.
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationRow {
    pub id: String,
    pub used_bytes: i64,
    pub reserved_bytes: i64,
    pub limit_bytes: i64,
}

/// The per-tenant quota aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuotaLedger {
    pub org_id: String,
    pub used_bytes: u64,
    pub reserved_bytes: u64,
    pub limit_bytes: u64,
}

impl QuotaLedger {
    /// Committed plus in-flight bytes.
    pub fn claimed_bytes(&self) -> u64 {
        self.used_bytes.saturating_add(self.reserved_bytes)
    }

    pub fn available_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.claimed_bytes())
    }

    pub fn can_reserve(&self, bytes: u64) -> bool {
        bytes <= self.available_bytes()
    }

    /// `round(100 * claimed / limit)` capped at 100; a zero limit reports 0.
    pub fn usage_percent(&self) -> u8 {
        if self.limit_bytes == 0 {
            return 0;
        }
        let claimed = self.used_bytes as u128 + self.reserved_bytes as u128;
        let limit = self.limit_bytes as u128;
        let percent = (claimed * 100 + limit / 2) / limit;
        percent.min(100) as u8
    }
}

impl From<OrganizationRow> for QuotaLedger {
    fn from(row: OrganizationRow) -> Self {
        Self {
            org_id: row.id,
            used_bytes: row.used_bytes.max(0) as u64,
            reserved_bytes: row.reserved_bytes.max(0) as u64,
            limit_bytes: row.limit_bytes.max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuotaSnapshot {
    pub org_id: String,
    pub used_bytes: u64,
    pub reserved_bytes: u64,
    pub limit_bytes: u64,
    pub available_bytes: u64,
    pub usage_percent: u8,
}

impl From<QuotaLedger> for QuotaSnapshot {
    fn from(ledger: QuotaLedger) -> Self {
        Self {
            available_bytes: ledger.available_bytes(),
            usage_percent: ledger.usage_percent(),
            used_bytes: ledger.used_bytes,
            reserved_bytes: ledger.reserved_bytes,
            limit_bytes: ledger.limit_bytes,
            org_id: ledger.org_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub id: String,
    pub limit_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLimitRequest {
    pub limit_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(used: u64, reserved: u64, limit: u64) -> QuotaLedger {
        QuotaLedger {
            org_id: "org".to_string(),
            used_bytes: used,
            reserved_bytes: reserved,
            limit_bytes: limit,
        }
    }

    #[test]
    fn test_available_bytes() {
        assert_eq!(ledger(0, 600, 1000).available_bytes(), 400);
        assert_eq!(ledger(300, 0, 1000).available_bytes(), 700);
        // Reconciliation can leave usage above the limit.
        assert_eq!(ledger(900, 200, 1000).available_bytes(), 0);
    }

    #[test]
    fn test_can_reserve_boundary() {
        let l = ledger(100, 500, 1000);
        assert!(l.can_reserve(400));
        assert!(!l.can_reserve(401));
    }

    #[test]
    fn test_usage_percent_zero_limit() {
        assert_eq!(ledger(0, 0, 0).usage_percent(), 0);
        assert_eq!(ledger(10, 5, 0).usage_percent(), 0);
    }

    #[test]
    fn test_usage_percent_rounding_and_cap() {
        assert_eq!(ledger(600, 0, 1000).usage_percent(), 60);
        assert_eq!(ledger(1, 0, 3).usage_percent(), 33);
        assert_eq!(ledger(2, 0, 3).usage_percent(), 67);
        assert_eq!(ledger(5, 0, 1000).usage_percent(), 1);
        assert_eq!(ledger(4, 0, 1000).usage_percent(), 0);
        assert_eq!(ledger(1500, 0, 1000).usage_percent(), 100);
    }

    #[test]
    fn test_usage_percent_large_counters() {
        let l = ledger(u64::MAX / 2, u64::MAX / 2, u64::MAX);
        assert_eq!(l.usage_percent(), 100);
        assert_eq!(l.available_bytes(), 1);

        let l = ledger(i64::MAX as u64 / 4, 0, i64::MAX as u64);
        assert_eq!(l.usage_percent(), 25);
    }

    #[test]
    fn test_snapshot_from_ledger() {
        let snapshot = QuotaSnapshot::from(ledger(300, 200, 1000));
        assert_eq!(snapshot.available_bytes, 500);
        assert_eq!(snapshot.usage_percent, 50);
        assert_eq!(snapshot.org_id, "org");
    }
}
