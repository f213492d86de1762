//! Upstream host selection for proxy sidecars.
//!
//! Given the hosts of a cluster, pick the one that receives the next
//! outbound request: random, round robin, EDF-weighted round robin or
//! least active request, chosen per cluster through a policy registry.

pub mod cluster;
pub mod config;
pub mod load_balancer;
pub mod observability;

pub use cluster::ClusterManager;
pub use config::ProxyConfig;
pub use load_balancer::{LoadBalancer, LoadBalancerContext, LoadBalancerRegistry, LoadBalancerType};
