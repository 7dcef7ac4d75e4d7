//! Utility module: errors, logging, metrics, and serde helpers.

pub mod errors;
pub mod metrics;
pub mod logging;
pub mod serde_helpers;

pub use errors::{NodeError, Result};
pub use metrics::{MetricsRegistry, METRICS};
pub use logging::init_logging;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
