use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationReport {
    pub org_id: String,
    pub previous_used: u64,
    pub calculated_used: u64,
    /// `previous_used - calculated_used`; positive means the ledger over-counts.
    pub deviation: i64,
    pub corrected: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub fix: bool,
}
