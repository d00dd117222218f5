//! Reference plugins built on the public plugin contract.
//!
//! - [`LoggingPlugin`]: traces every request, response and failure
//! - [`MetricsPlugin`]: request counters and latency in the plugin's metrics
//! - [`HeaderAuthPlugin`]: injects a credential header from its settings

mod auth;
mod logging;
mod metrics;

pub use auth::HeaderAuthPlugin;
pub use logging::LoggingPlugin;
pub use metrics::MetricsPlugin;
