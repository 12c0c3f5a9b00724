//! Structured logging.
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level so operators can raise
//!   verbosity without editing config
//! - Library code only emits `tracing` events; installing a subscriber is
//!   the binary's job

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor config specify one.
pub const DEFAULT_FILTER: &str = "cluster_client=info";

/// Build the filter: `RUST_LOG`, else `level`, else [`DEFAULT_FILTER`].
pub fn filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| match level {
            Some(level) => EnvFilter::try_new(level),
            None => EnvFilter::try_new(DEFAULT_FILTER),
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(level: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
