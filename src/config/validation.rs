//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (hosts reference declared clusters)
//! - Validate value ranges (choice count >= 1, addresses parse)
//! - Detect duplicate clusters and hosts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Unknown policy names are not errors; the registry falls back to round robin

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{LoadBalancerConfig, ProxyConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Cluster declared with an empty name.
    #[error("cluster name must not be empty")]
    EmptyClusterName,

    /// Same cluster declared twice.
    #[error("duplicate cluster: {0}")]
    DuplicateCluster(String),

    /// Least-request sampling needs at least one candidate.
    #[error("choice_count must be at least 1 ({scope})")]
    ZeroChoiceCount { scope: String },

    /// Host address is not a socket address.
    #[error("invalid host address {address:?} in cluster {cluster}")]
    InvalidAddress { cluster: String, address: String },

    /// Host references a cluster that is not declared.
    #[error("host {address} references unknown cluster {cluster}")]
    UnknownCluster { cluster: String, address: String },

    /// Same address listed twice in one cluster.
    #[error("duplicate host {address} in cluster {cluster}")]
    DuplicateHost { cluster: String, address: String },
}

fn check_load_balancer(config: &LoadBalancerConfig, scope: &str, errors: &mut Vec<ValidationError>) {
    if config.choice_count == 0 {
        errors.push(ValidationError::ZeroChoiceCount {
            scope: scope.to_string(),
        });
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_load_balancer(&config.load_balancer, "load_balancer", &mut errors);

    let mut declared = HashSet::new();
    for cluster in &config.clusters {
        if cluster.name.is_empty() {
            errors.push(ValidationError::EmptyClusterName);
        } else if !declared.insert(cluster.name.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.name.clone()));
        }
        if let Some(lb) = &cluster.load_balancer {
            check_load_balancer(lb, &format!("cluster {}", cluster.name), &mut errors);
        }
    }

    let mut seen = HashSet::new();
    for host in &config.hosts {
        if host.cluster.is_empty() {
            errors.push(ValidationError::EmptyClusterName);
        } else if !config.clusters.is_empty() && !declared.contains(host.cluster.as_str()) {
            errors.push(ValidationError::UnknownCluster {
                cluster: host.cluster.clone(),
                address: host.address.clone(),
            });
        }

        match host.address.parse::<SocketAddr>() {
            Ok(addr) => {
                if !seen.insert((host.cluster.as_str(), addr)) {
                    errors.push(ValidationError::DuplicateHost {
                        cluster: host.cluster.clone(),
                        address: host.address.clone(),
                    });
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                cluster: host.cluster.clone(),
                address: host.address.clone(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ClusterConfig, HostConfig};

    fn host(cluster: &str, address: &str) -> HostConfig {
        HostConfig {
            cluster: cluster.into(),
            address: address.into(),
            hostname: None,
            weight: 1,
            healthy: true,
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = ProxyConfig::default();
        config.hosts.push(host("web", "127.0.0.1:8080"));
        config.hosts.push(host("web", "127.0.0.1:8081"));
        config.hosts.push(host("api", "127.0.0.1:8080"));
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = ProxyConfig::default();
        config.load_balancer.choice_count = 0;
        config.clusters.push(ClusterConfig { name: "web".into(), load_balancer: None });
        config.clusters.push(ClusterConfig { name: "web".into(), load_balancer: None });
        config.hosts.push(host("web", "not-an-address"));
        config.hosts.push(host("web", "127.0.0.1:8080"));
        config.hosts.push(host("web", "127.0.0.1:8080"));
        config.hosts.push(host("db", "127.0.0.1:5432"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroChoiceCount { scope: "load_balancer".into() },
                ValidationError::DuplicateCluster("web".into()),
                ValidationError::InvalidAddress { cluster: "web".into(), address: "not-an-address".into() },
                ValidationError::DuplicateHost { cluster: "web".into(), address: "127.0.0.1:8080".into() },
                ValidationError::UnknownCluster { cluster: "db".into(), address: "127.0.0.1:5432".into() },
            ]
        );
    }

    #[test]
    fn test_cluster_override_checked() {
        let mut config = ProxyConfig::default();
        config.clusters.push(ClusterConfig {
            name: "web".into(),
            load_balancer: Some(LoadBalancerConfig { choice_count: 0, ..Default::default() }),
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ZeroChoiceCount { scope: "cluster web".into() }]);
    }
}
