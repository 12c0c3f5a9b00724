//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Balancer, dialer, router produce:
//!     → logging.rs (structured tracing events, endpoint/connection fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber (binary only)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
