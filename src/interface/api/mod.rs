//! API interface implementations

pub mod metrics_handler;
pub mod relay;
pub mod router;

pub use metrics_handler::{init_metrics, metrics_handler};
pub use relay::{RelayError, RelayState};
pub use router::build_router;
