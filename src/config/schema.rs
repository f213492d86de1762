//! Configuration schema definitions.
//!
//! This module defines the configuration of clusters, their hosts and the
//! load balancing policy used for each cluster. All types derive Serde traits
//! for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::load_balancer::least_request::DEFAULT_CHOICE_COUNT;
use crate::load_balancer::LoadBalancerType;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Policy used by clusters that do not set their own.
    pub load_balancer: LoadBalancerConfig,

    /// Cluster definitions. When empty, clusters are implied by `hosts`.
    pub clusters: Vec<ClusterConfig>,

    /// Upstream host definitions.
    pub hosts: Vec<HostConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// The load balancer settings that apply to `cluster`.
    pub fn load_balancer_for(&self, cluster: &str) -> &LoadBalancerConfig {
        self.clusters
            .iter()
            .find(|c| c.name == cluster)
            .and_then(|c| c.load_balancer.as_ref())
            .unwrap_or(&self.load_balancer)
    }

    /// Cluster names in declaration order, or in first-seen host order when
    /// no clusters are declared.
    pub fn cluster_names(&self) -> Vec<String> {
        if !self.clusters.is_empty() {
            return self.clusters.iter().map(|c| c.name.clone()).collect();
        }
        let mut names: Vec<String> = Vec::new();
        for host in &self.hosts {
            if !names.contains(&host.cluster) {
                names.push(host.cluster.clone());
            }
        }
        names
    }
}

/// Load balancing policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Policy identifier (e.g., "LB_ROUNDROBIN", "LB_LEAST_REQUEST").
    /// Unknown identifiers fall back to round robin.
    pub policy: LoadBalancerType,

    /// Number of hosts sampled by the least-active-request policy.
    pub choice_count: usize,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            policy: LoadBalancerType::ROUND_ROBIN,
            choice_count: DEFAULT_CHOICE_COUNT,
        }
    }
}

/// Cluster configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Cluster identifier, referenced by hosts.
    pub name: String,

    /// Overrides the root load balancer settings.
    #[serde(default)]
    pub load_balancer: Option<LoadBalancerConfig>,
}

/// Upstream host configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Cluster this host belongs to.
    pub cluster: String,

    /// Host address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Optional logical name.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Initial health state (default: healthy).
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_healthy() -> bool {
    true
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
