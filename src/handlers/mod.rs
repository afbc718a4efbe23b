use metrics_exporter_prometheus::PrometheusHandle;

use crate::{
    config::Config,
    database::Database,
    services::{
        MetricsService, OrganizationService, QuotaQueryService, ReconciliationService,
        ReservationService,
    },
};

pub mod docs;
pub mod health;
pub mod metrics;
pub mod organizations;
pub mod quota;
pub mod reconciliation;
pub mod reservations;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Config,
    pub reservations: ReservationService,
    pub quota: QuotaQueryService,
    pub reconciliation: ReconciliationService,
    pub organizations: OrganizationService,
    pub metrics: MetricsService,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(database: Database, config: Config, prometheus: PrometheusHandle) -> Self {
        let reservations = ReservationService::new(database.ledger(), config.reservation_ttl());
        let quota = QuotaQueryService::new(database.ledger(), reservations.clone());
        let reconciliation = ReconciliationService::new(database.ledger(), database.objects());
        let organizations = OrganizationService::new(database.ledger(), config.default_limit_bytes);

        Self {
            database,
            config,
            reservations,
            quota,
            reconciliation,
            organizations,
            metrics: MetricsService::new(),
            prometheus,
        }
    }
}
