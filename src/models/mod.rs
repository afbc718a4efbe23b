pub mod organization;
pub mod reconciliation;
pub mod reservation;

pub use organization::*;
pub use reconciliation::*;
pub use reservation::*;
