use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::models::Resolution;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsService;

impl MetricsService {
    pub fn new() -> Self {
        Self
    }

    pub fn record_reservation(&self, bytes: u64) {
        counter!("quota_reservations_total").increment(1);
        counter!("quota_reserved_bytes_total").increment(bytes);
    }

    pub fn record_rejection(&self) {
        counter!("quota_reservations_rejected_total").increment(1);
    }

    pub fn record_resolution(&self, resolution: Resolution, bytes: u64) {
        counter!("quota_resolutions_total", "resolution" => resolution.as_str()).increment(1);
        counter!("quota_resolved_bytes_total", "resolution" => resolution.as_str()).increment(bytes);
    }

    pub fn record_stale_resolution(&self, resolution: Resolution) {
        counter!("quota_stale_resolutions_total", "resolution" => resolution.as_str()).increment(1);
    }

    pub fn record_sweep(&self, bytes_reclaimed: u64) {
        counter!("quota_swept_bytes_total").increment(bytes_reclaimed);
    }

    pub fn record_deviation(&self, org_id: &str, deviation: i64) {
        gauge!("quota_reconciliation_deviation_bytes", "org_id" => org_id.to_string())
            .set(deviation as f64);
    }

    pub fn record_error(&self, error_type: &str) {
        counter!("errors_total", "type" => error_type.to_string()).increment(1);
    }
}

pub struct RequestTimer {
    start: Instant,
    endpoint: String,
}

impl RequestTimer {
    pub fn new(endpoint: String) -> Self {
        Self {
            start: Instant::now(),
            endpoint,
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        histogram!("request_duration_seconds", "endpoint" => self.endpoint.clone())
            .record(duration.as_secs_f64());
    }
}
