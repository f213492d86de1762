//! Cluster membership snapshots.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::host::HostRef;

/// Membership of one cluster as seen by a load balancer.
///
/// Implementations return immutable snapshots; callers read each list once
/// per selection and operate on that copy.
pub trait HostSet: Send + Sync + fmt::Debug {
    /// Every member of the cluster.
    fn hosts(&self) -> Arc<Vec<HostRef>>;

    /// The members that were healthy when the list was last recomputed.
    fn healthy_hosts(&self) -> Arc<Vec<HostRef>>;
}

#[derive(Debug)]
struct Snapshot {
    hosts: Arc<Vec<HostRef>>,
    healthy: Arc<Vec<HostRef>>,
}

impl Snapshot {
    fn new(hosts: Arc<Vec<HostRef>>) -> Self {
        let healthy = Arc::new(healthy_subset(&hosts));
        Self { hosts, healthy }
    }
}

fn healthy_subset(hosts: &[HostRef]) -> Vec<HostRef> {
    hosts.iter().filter(|h| h.health()).cloned().collect()
}

fn same_hosts(a: &[HostRef], b: &[HostRef]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}

/// A lock-free host set.
///
/// Uses `ArcSwap` so membership and health recomputation publish a complete
/// snapshot without blocking readers on the request path.
#[derive(Debug)]
pub struct ClusterHostSet {
    snapshot: ArcSwap<Snapshot>,
}

impl ClusterHostSet {
    pub fn new(hosts: Vec<HostRef>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::new(Arc::new(hosts))),
        }
    }

    /// Replace the membership and recompute the healthy list.
    pub fn update_hosts(&self, hosts: Vec<HostRef>) {
        self.snapshot.store(Arc::new(Snapshot::new(Arc::new(hosts))));
    }

    /// Recompute the healthy list from the hosts' current health flags.
    ///
    /// Returns true if the healthy list changed.
    pub fn refresh_healthy(&self) -> bool {
        let mut changed = false;
        self.snapshot.rcu(|current| {
            let healthy = healthy_subset(&current.hosts);
            changed = !same_hosts(&healthy, &current.healthy);
            Snapshot {
                hosts: Arc::clone(&current.hosts),
                healthy: Arc::new(healthy),
            }
        });
        changed
    }

    /// Look a member up by address.
    pub fn find(&self, address: SocketAddr) -> Option<HostRef> {
        self.snapshot
            .load()
            .hosts
            .iter()
            .find(|h| h.address() == address)
            .cloned()
    }
}

impl HostSet for ClusterHostSet {
    fn hosts(&self) -> Arc<Vec<HostRef>> {
        Arc::clone(&self.snapshot.load().hosts)
    }

    fn healthy_hosts(&self) -> Arc<Vec<HostRef>> {
        Arc::clone(&self.snapshot.load().healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::host::{Host, UpstreamHost};

    fn upstream(port: u16) -> Arc<UpstreamHost> {
        Arc::new(UpstreamHost::new(SocketAddr::from(([127, 0, 0, 1], port)), 1))
    }

    #[test]
    fn test_healthy_subset_tracks_flags() {
        let h1 = upstream(8080);
        let h2 = upstream(8081);
        h2.set_healthy(false);
        let set = ClusterHostSet::new(vec![h1.clone() as HostRef, h2.clone() as HostRef]);

        assert_eq!(set.hosts().len(), 2);
        assert_eq!(set.healthy_hosts().len(), 1);
        assert_eq!(set.healthy_hosts()[0].address(), h1.address());

        // Flags alone do not change the published list.
        h2.set_healthy(true);
        assert_eq!(set.healthy_hosts().len(), 1);
        assert!(set.refresh_healthy());
        assert_eq!(set.healthy_hosts().len(), 2);
        assert!(!set.refresh_healthy());
    }

    #[test]
    fn test_update_and_find() {
        let set = ClusterHostSet::new(Vec::new());
        assert!(set.hosts().is_empty());

        let h1 = upstream(9000);
        set.update_hosts(vec![h1.clone() as HostRef]);
        assert!(set.find(h1.address()).is_some());
        assert!(set.find(SocketAddr::from(([127, 0, 0, 1], 9001))).is_none());
    }

    #[test]
    fn test_snapshot_survives_update() {
        let set = ClusterHostSet::new(vec![upstream(8080) as HostRef, upstream(8081) as HostRef]);
        let before = set.hosts();
        set.update_hosts(vec![upstream(8082) as HostRef]);
        assert_eq!(before.len(), 2);
        assert_eq!(set.hosts().len(), 1);
    }
}
