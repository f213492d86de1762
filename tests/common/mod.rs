//! Shared fixtures for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use upstream_lb::load_balancer::{ClusterHostSet, HostRef, LoadBalancer, UpstreamHost};

/// Build hosts on consecutive localhost ports with the given weights.
pub fn hosts_with_weights(weights: &[u32]) -> Vec<Arc<UpstreamHost>> {
    weights
        .iter()
        .enumerate()
        .map(|(i, w)| Arc::new(UpstreamHost::new(SocketAddr::from(([127, 0, 0, 1], 8080 + i as u16)), *w)))
        .collect()
}

/// Build `n` hosts of weight 1.
pub fn hosts(n: usize) -> Vec<Arc<UpstreamHost>> {
    hosts_with_weights(&vec![1; n])
}

pub fn host_set(hosts: &[Arc<UpstreamHost>]) -> Arc<ClusterHostSet> {
    Arc::new(ClusterHostSet::new(hosts.iter().map(|h| Arc::clone(h) as HostRef).collect()))
}

/// Call `choose_host` `n` times and count selections per address.
#[allow(dead_code)]
pub fn tally(lb: &dyn LoadBalancer, n: usize) -> HashMap<SocketAddr, usize> {
    let mut counts = HashMap::new();
    for _ in 0..n {
        let host = lb.choose_host(None).expect("a host should be available");
        *counts.entry(host.address()).or_insert(0) += 1;
    }
    counts
}
