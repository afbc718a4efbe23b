use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{database::LedgerStore, errors::Result, services::reservation::ReservationService};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub organizations: usize,
    pub bytes_reclaimed: u64,
    pub failures: usize,
}

/// Periodic expiry sweep across all tenants. Complements the lazy sweep
/// done by `reserve` and snapshot reads for tenants that go quiet.
pub struct ExpirySweeper {
    store: Arc<dyn LedgerStore>,
    reservations: ReservationService,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn LedgerStore>, reservations: ReservationService, interval: Duration) -> Self {
        Self {
            store,
            reservations,
            interval,
        }
    }

    pub async fn sweep_all(&self) -> Result<SweepSummary> {
        self.sweep_all_at(Utc::now()).await
    }

    /// One pass. A failing organization is logged and skipped.
    pub async fn sweep_all_at(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let org_ids = self.store.orgs_with_expired_reservations(now).await?;
        let mut summary = SweepSummary::default();

        for org_id in &org_ids {
            match self.reservations.sweep_expired_at(org_id, now).await {
                Ok(reclaimed) => {
                    summary.organizations += 1;
                    summary.bytes_reclaimed += reclaimed;
                }
                Err(e) => {
                    error!(org_id = %org_id, "Expiry sweep failed: {}", e);
                    summary.failures += 1;
                }
            }
        }

        Ok(summary)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep_all().await {
                        Ok(summary) if summary.bytes_reclaimed > 0 || summary.failures > 0 => {
                            info!(
                                organizations = summary.organizations,
                                bytes_reclaimed = summary.bytes_reclaimed,
                                failures = summary.failures,
                                "Expiry sweep pass finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Expiry sweep pass failed: {}", e),
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
