pub mod metrics;
pub mod organization;
pub mod quota_query;
pub mod reconciliation;
pub mod reservation;
pub mod sweeper;

pub use self::metrics::{MetricsService, RequestTimer};
pub use organization::*;
pub use quota_query::*;
pub use reconciliation::*;
pub use reservation::*;
pub use sweeper::*;
