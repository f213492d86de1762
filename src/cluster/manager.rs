//! Cluster management.
//!
//! # Responsibilities
//! - Group hosts into named clusters
//! - Build each cluster's load balancer through the registry
//! - Republish membership and health, then refresh the load balancer

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::{HostConfig, LoadBalancerConfig, ProxyConfig};
use crate::load_balancer::{
    ClusterHostSet, Host, HostRef, HostSet, LoadBalancer, LoadBalancerContext, LoadBalancerRegistry,
    LoadBalancerType, UpstreamHost,
};
use crate::observability::metrics;

/// One named cluster: its members and the load balancer built over them.
#[derive(Debug)]
pub struct Cluster {
    name: String,
    config: LoadBalancerConfig,
    members: ArcSwap<Vec<Arc<UpstreamHost>>>,
    host_set: Arc<ClusterHostSet>,
    lb: Arc<dyn LoadBalancer>,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        config: LoadBalancerConfig,
        members: Vec<Arc<UpstreamHost>>,
        registry: &LoadBalancerRegistry,
    ) -> Self {
        let name = name.into();
        let host_set = Arc::new(ClusterHostSet::new(as_host_refs(&members)));
        let lb = registry.build_with_config(&config, Arc::clone(&host_set) as Arc<dyn HostSet>);
        let cluster = Self {
            name,
            config,
            members: ArcSwap::from_pointee(members),
            host_set,
            lb,
        };
        cluster.record_hosts();
        cluster
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &LoadBalancerType {
        &self.config.policy
    }

    pub fn host_set(&self) -> &Arc<ClusterHostSet> {
        &self.host_set
    }

    pub fn load_balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.lb
    }

    /// Select the host for the next request.
    pub fn choose_host(&self, context: Option<&LoadBalancerContext>) -> Option<HostRef> {
        let host = self.lb.choose_host(context);
        metrics::record_choose(&self.name, host.is_some());
        if host.is_none() {
            tracing::debug!(
                cluster = %self.name,
                host_count = self.host_set.hosts().len(),
                healthy_count = self.host_set.healthy_hosts().len(),
                "No healthy host found in cluster"
            );
        }
        host
    }

    /// Replace the membership and rebuild scheduling state.
    pub fn update_hosts(&self, members: Vec<Arc<UpstreamHost>>) {
        self.host_set.update_hosts(as_host_refs(&members));
        self.members.store(Arc::new(members));
        tracing::info!(cluster = %self.name, hosts = self.host_set.hosts().len(), "Cluster membership updated");
        self.refresh_load_balancer();
    }

    /// Flip a member's health flag. Returns false if no member has `address`.
    pub fn set_host_health(&self, address: SocketAddr, healthy: bool) -> bool {
        let members = self.members.load();
        let Some(host) = members.iter().find(|h| h.address() == address) else {
            return false;
        };
        if host.health() != healthy {
            host.set_healthy(healthy);
            tracing::info!(cluster = %self.name, addr = %address, healthy, "Host health changed");
        }
        self.refresh();
        true
    }

    /// Recompute the healthy list from current host flags and refresh the
    /// load balancer if it changed.
    pub fn refresh(&self) -> bool {
        let changed = self.host_set.refresh_healthy();
        if changed {
            self.refresh_load_balancer();
        }
        changed
    }

    fn refresh_load_balancer(&self) {
        self.lb.refresh();
        metrics::record_refresh(&self.name);
        self.record_hosts();
    }

    fn record_hosts(&self) {
        metrics::record_hosts(
            &self.name,
            self.host_set.hosts().len(),
            self.host_set.healthy_hosts().len(),
        );
    }
}

fn as_host_refs(members: &[Arc<UpstreamHost>]) -> Vec<HostRef> {
    members.iter().map(|h| Arc::clone(h) as HostRef).collect()
}

/// Build an upstream host from configuration. `None` if the address is invalid.
pub fn host_from_config(config: &HostConfig) -> Option<Arc<UpstreamHost>> {
    let Ok(addr) = config.address.parse::<SocketAddr>() else {
        tracing::warn!(cluster = %config.cluster, "Invalid host address: {}", config.address);
        return None;
    };
    let host = UpstreamHost::new(addr, config.weight);
    let host = match &config.hostname {
        Some(name) => host.with_hostname(name.clone()),
        None => host,
    };
    host.set_healthy(config.healthy);
    Some(Arc::new(host))
}

/// Owns the clusters of this process.
#[derive(Debug)]
pub struct ClusterManager {
    clusters: DashMap<String, Arc<Cluster>>,
    registry: Arc<LoadBalancerRegistry>,
}

impl ClusterManager {
    pub fn new(registry: Arc<LoadBalancerRegistry>) -> Self {
        Self {
            clusters: DashMap::new(),
            registry,
        }
    }

    /// Create clusters and their load balancers from configuration.
    pub fn from_config(config: &ProxyConfig, registry: Arc<LoadBalancerRegistry>) -> Self {
        let manager = Self::new(registry);
        for name in config.cluster_names() {
            let members = config
                .hosts
                .iter()
                .filter(|h| h.cluster == name)
                .filter_map(host_from_config)
                .collect();
            let lb_config = config.load_balancer_for(&name).clone();
            manager.add_cluster(name, lb_config, members);
        }
        manager
    }

    pub fn registry(&self) -> &Arc<LoadBalancerRegistry> {
        &self.registry
    }

    /// Add a cluster, replacing any cluster with the same name.
    pub fn add_cluster(
        &self,
        name: impl Into<String>,
        config: LoadBalancerConfig,
        members: Vec<Arc<UpstreamHost>>,
    ) -> Arc<Cluster> {
        let name = name.into();
        let cluster = Arc::new(Cluster::new(name.clone(), config, members, &self.registry));
        tracing::info!(
            cluster = %name,
            policy = %cluster.policy(),
            hosts = cluster.host_set().hosts().len(),
            "Cluster added"
        );
        self.clusters.insert(name, Arc::clone(&cluster));
        cluster
    }

    pub fn remove_cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        let removed = self.clusters.remove(name).map(|(_, cluster)| cluster);
        if removed.is_some() {
            tracing::info!(cluster = %name, "Cluster removed");
        }
        removed
    }

    pub fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Cluster names, sorted.
    pub fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clusters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Select a host in the named cluster.
    pub fn choose_host(&self, cluster: &str, context: Option<&LoadBalancerContext>) -> Option<HostRef> {
        match self.cluster(cluster) {
            Some(c) => c.choose_host(context),
            None => {
                tracing::debug!(cluster = %cluster, "Cluster not found in ClusterManager");
                metrics::record_choose(cluster, false);
                None
            }
        }
    }

    /// Replace a cluster's membership. Returns false for an unknown cluster.
    pub fn update_hosts(&self, cluster: &str, members: Vec<Arc<UpstreamHost>>) -> bool {
        match self.cluster(cluster) {
            Some(c) => {
                c.update_hosts(members);
                true
            }
            None => false,
        }
    }

    /// Flip a host's health flag. Returns false if the cluster or host is unknown.
    pub fn set_host_health(&self, cluster: &str, address: SocketAddr, healthy: bool) -> bool {
        self.cluster(cluster)
            .is_some_and(|c| c.set_host_health(address, healthy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_str;

    fn upstream(port: u16, weight: u32) -> Arc<UpstreamHost> {
        Arc::new(UpstreamHost::new(SocketAddr::from(([127, 0, 0, 1], port)), weight))
    }

    #[test]
    fn test_from_config() {
        let config = load_config_str(
            r#"
            [[clusters]]
            name = "web"
            load_balancer = { policy = "LB_LEAST_REQUEST" }

            [[clusters]]
            name = "empty"

            [[hosts]]
            cluster = "web"
            address = "127.0.0.1:8080"

            [[hosts]]
            cluster = "web"
            address = "127.0.0.1:8081"
            healthy = false
            "#,
        )
        .unwrap();
        let manager = ClusterManager::from_config(&config, Arc::new(LoadBalancerRegistry::new()));

        assert_eq!(manager.cluster_names(), vec!["empty", "web"]);
        let web = manager.cluster("web").unwrap();
        assert_eq!(web.policy(), &LoadBalancerType::LEAST_ACTIVE_REQUEST);
        assert_eq!(web.host_set().healthy_hosts().len(), 1);

        for _ in 0..10 {
            let host = manager.choose_host("web", None).unwrap();
            assert_eq!(host.address().port(), 8080);
        }
        assert!(manager.choose_host("empty", None).is_none());
        assert!(manager.choose_host("missing", None).is_none());
    }

    #[test]
    fn test_health_change_refreshes_weighted_lb() {
        let manager = ClusterManager::new(Arc::new(LoadBalancerRegistry::new()));
        let config = LoadBalancerConfig {
            policy: LoadBalancerType::WEIGHTED_ROUND_ROBIN,
            ..Default::default()
        };
        let hosts = vec![upstream(8080, 1), upstream(8081, 3)];
        manager.add_cluster("web", config, hosts.clone());

        assert!(manager.set_host_health("web", hosts[1].address(), false));
        for _ in 0..20 {
            assert_eq!(manager.choose_host("web", None).unwrap().address(), hosts[0].address());
        }

        assert!(manager.set_host_health("web", hosts[1].address(), true));
        let heavy = (0..400)
            .filter(|_| manager.choose_host("web", None).unwrap().address() == hosts[1].address())
            .count();
        assert_eq!(heavy, 300);

        assert!(!manager.set_host_health("web", SocketAddr::from(([10, 0, 0, 1], 80)), false));
        assert!(!manager.set_host_health("nope", hosts[0].address(), false));
    }

    #[test]
    fn test_update_hosts_and_remove() {
        let manager = ClusterManager::new(Arc::new(LoadBalancerRegistry::new()));
        manager.add_cluster("web", LoadBalancerConfig::default(), Vec::new());
        assert!(manager.choose_host("web", None).is_none());

        assert!(manager.update_hosts("web", vec![upstream(9000, 1)]));
        assert_eq!(manager.choose_host("web", None).unwrap().address().port(), 9000);
        assert!(!manager.update_hosts("api", Vec::new()));

        assert!(manager.remove_cluster("web").is_some());
        assert!(manager.remove_cluster("web").is_none());
        assert!(manager.cluster_names().is_empty());
    }

    #[test]
    fn test_host_from_config() {
        let cfg = HostConfig {
            cluster: "web".into(),
            address: "127.0.0.1:8080".into(),
            hostname: Some("web-1".into()),
            weight: 5,
            healthy: false,
        };
        let host = host_from_config(&cfg).unwrap();
        assert_eq!(host.hostname(), "web-1");
        assert_eq!(host.weight(), 5);
        assert!(!host.health());

        let bad = HostConfig { address: "bogus".into(), ..cfg };
        assert!(host_from_config(&bad).is_none());
    }
}
