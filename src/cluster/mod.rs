//! Cluster subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyConfig (clusters + hosts)
//!     → manager.rs groups hosts by cluster
//!     → registry builds one load balancer per cluster
//!     → choose_host(cluster) on every outbound request
//!
//! On membership or health change:
//!     → ClusterHostSet publishes a new snapshot
//!     → load balancer refresh() rebuilds scheduling state
//! ```
//!
//! # Design Decisions
//! - The manager owns hosts; load balancers only read them
//! - Health is flipped here (or by the embedding health checker), never by a strategy
//! - Unknown clusters and empty clusters both yield "no host"

pub mod manager;

pub use manager::{host_from_config, Cluster, ClusterManager};
