//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Cluster manager and strategies produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or pretty)
//!     → Whatever metrics recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (cluster, policy) on every event
//! - Metrics are cheap; without an installed recorder they are no-ops
//! - The request path never logs above debug level

pub mod logging;
pub mod metrics;
