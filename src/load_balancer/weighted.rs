//! Weight-aware base strategy backed by the EDF scheduler.
//!
//! When the healthy hosts disagree on weight, selection goes through an
//! [`EdfScheduler`]. When they agree, the injected [`UnweightedChooser`]
//! picks among all healthy hosts instead.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::load_balancer::edf::EdfScheduler;
use crate::load_balancer::host_set::HostSet;
use crate::load_balancer::{Host, HostRef, LoadBalancer, LoadBalancerContext, MetadataMatchCriteria};

/// Selection among healthy hosts when weights carry no information.
///
/// `healthy_hosts` is the list as of the last recompute and may include
/// hosts that have since gone down: implementations must not return a host
/// whose `health()` is false. The random source is shared with the owning
/// balancer and must be locked before use.
pub trait UnweightedChooser: Send + Sync + fmt::Debug {
    fn choose(
        &self,
        context: Option<&LoadBalancerContext>,
        healthy_hosts: &[HostRef],
        rng: &Mutex<StdRng>,
    ) -> Option<HostRef>;
}

/// Maps a host to its scheduling weight.
pub trait HostWeight: Send + Sync {
    fn host_weight(&self, host: &dyn Host) -> u32;
}

impl<F> HostWeight for F
where
    F: Fn(&dyn Host) -> u32 + Send + Sync,
{
    fn host_weight(&self, host: &dyn Host) -> u32 {
        self(host)
    }
}

/// Uses the weight the host was configured with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredWeight;

impl HostWeight for ConfiguredWeight {
    fn host_weight(&self, host: &dyn Host) -> u32 {
        host.weight()
    }
}

/// True when no two weights differ (vacuously true for zero or one).
pub fn weights_are_equal(weights: impl IntoIterator<Item = u32>) -> bool {
    let mut weights = weights.into_iter();
    match weights.next() {
        Some(first) => weights.all(|w| w == first),
        None => true,
    }
}

/// True when every host carries the same configured weight.
pub fn host_weights_are_equal(hosts: &[HostRef]) -> bool {
    weights_are_equal(hosts.iter().map(|h| h.weight()))
}

// Upper bound on scheduler picks skipped in one selection.
const MAX_SKIPPED_PICKS: u64 = 1024;

/// Base strategy: EDF when weights differ, the unweighted chooser otherwise.
pub struct EdfLoadBalancer {
    scheduler: ArcSwapOption<EdfScheduler<HostRef>>,
    /// Serializes rebuilds so a scheduler built from an older healthy list
    /// never replaces one built from a newer list.
    refresh_lock: Mutex<()>,
    hosts: Arc<dyn HostSet>,
    rng: Mutex<StdRng>,
    unweighted: Box<dyn UnweightedChooser>,
    host_weight: Box<dyn HostWeight>,
}

impl EdfLoadBalancer {
    pub fn new(hosts: Arc<dyn HostSet>, unweighted: impl UnweightedChooser + 'static) -> Self {
        Self::with_host_weight(hosts, unweighted, ConfiguredWeight)
    }

    pub fn with_host_weight(
        hosts: Arc<dyn HostSet>,
        unweighted: impl UnweightedChooser + 'static,
        host_weight: impl HostWeight + 'static,
    ) -> Self {
        let lb = Self {
            scheduler: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            hosts,
            rng: Mutex::new(StdRng::from_entropy()),
            unweighted: Box::new(unweighted),
            host_weight: Box::new(host_weight),
        };
        lb.refresh();
        lb
    }

    /// Replace the random source handed to the unweighted chooser.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Whether selection currently goes through the EDF scheduler.
    pub fn is_weighted(&self) -> bool {
        self.scheduler.load().is_some()
    }

    /// Rebuild scheduling state from the given healthy hosts.
    ///
    /// A new scheduler is fully populated before it is published, so
    /// concurrent selections see either the old or the new one.
    pub fn refresh_with(&self, healthy_hosts: &[HostRef]) {
        let _guard = self.refresh_lock.lock();
        self.rebuild(healthy_hosts);
    }

    fn rebuild(&self, healthy_hosts: &[HostRef]) {
        let weights: Vec<u32> = healthy_hosts
            .iter()
            .map(|h| self.host_weight.host_weight(h.as_ref()))
            .collect();

        if weights_are_equal(weights.iter().copied()) {
            self.scheduler.store(None);
            return;
        }

        let scheduler = EdfScheduler::new();
        for (host, weight) in healthy_hosts.iter().zip(weights) {
            scheduler.add(Arc::clone(host), weight);
        }
        tracing::debug!(hosts = healthy_hosts.len(), "EDF scheduler rebuilt");
        self.scheduler.store(Some(Arc::new(scheduler)));
    }
}

impl LoadBalancer for EdfLoadBalancer {
    fn choose_host(&self, context: Option<&LoadBalancerContext>) -> Option<HostRef> {
        let healthy = self.hosts.healthy_hosts();
        if let Some(scheduler) = &*self.scheduler.load() {
            // Health can flip between refreshes; skip hosts that went down since.
            let cycle = scheduler.total_weight().min(MAX_SKIPPED_PICKS);
            let scheduled = (0..cycle)
                .filter_map(|_| scheduler.next())
                .find(|host| host.health());
            if scheduled.is_some() {
                return scheduled;
            }
            let live: Vec<HostRef> = healthy.iter().filter(|h| h.health()).cloned().collect();
            return self.unweighted.choose(context, &live, &self.rng);
        }
        self.unweighted.choose(context, &healthy, &self.rng)
    }

    fn host_num(&self, _metadata: Option<&MetadataMatchCriteria>) -> usize {
        self.hosts.hosts().len()
    }

    fn refresh(&self) {
        // Read under the lock: the last rebuild to run sees the newest list.
        let _guard = self.refresh_lock.lock();
        let healthy = self.hosts.healthy_hosts();
        self.rebuild(&healthy);
    }
}

impl fmt::Debug for EdfLoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdfLoadBalancer")
            .field("weighted", &self.is_weighted())
            .field("hosts", &self.hosts)
            .field("unweighted", &self.unweighted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::host::UpstreamHost;
    use crate::load_balancer::host_set::ClusterHostSet;
    use crate::load_balancer::round_robin::RoundRobinChooser;
    use std::collections::HashMap;

    fn weighted(weights: &[u32]) -> (Vec<Arc<UpstreamHost>>, Arc<ClusterHostSet>) {
        let backends: Vec<_> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                Arc::new(UpstreamHost::new(format!("127.0.0.1:{}", 8080 + i).parse().unwrap(), *w))
            })
            .collect();
        let set = Arc::new(ClusterHostSet::new(backends.iter().map(|h| h.clone() as HostRef).collect()));
        (backends, set)
    }

    #[test]
    fn test_weights_are_equal() {
        assert!(weights_are_equal(Vec::new()));
        assert!(weights_are_equal([4]));
        assert!(weights_are_equal([2, 2, 2]));
        assert!(!weights_are_equal([2, 2, 3]));

        let (_, set) = weighted(&[1, 1]);
        assert!(host_weights_are_equal(&set.hosts()));
        let (_, set) = weighted(&[1, 5]);
        assert!(!host_weights_are_equal(&set.hosts()));
    }

    #[test]
    fn test_equal_weights_use_unweighted_chooser() {
        let (backends, set) = weighted(&[3, 3]);
        let lb = EdfLoadBalancer::new(set, RoundRobinChooser::new());
        assert!(!lb.is_weighted());

        let a = lb.choose_host(None).unwrap();
        let b = lb.choose_host(None).unwrap();
        assert_eq!(a.address(), backends[0].address());
        assert_eq!(b.address(), backends[1].address());
    }

    #[test]
    fn test_weighted_selection() {
        let (backends, set) = weighted(&[1, 3]);
        let lb = EdfLoadBalancer::new(set, RoundRobinChooser::new());
        assert!(lb.is_weighted());

        let mut counts = HashMap::new();
        for _ in 0..4000 {
            *counts.entry(lb.choose_host(None).unwrap().address()).or_insert(0) += 1;
        }
        assert_eq!(counts[&backends[0].address()], 1000);
        assert_eq!(counts[&backends[1].address()], 3000);
    }

    #[test]
    fn test_refresh_drops_unhealthy_from_scheduler() {
        let (backends, set) = weighted(&[1, 2, 3]);
        let lb = EdfLoadBalancer::new(set.clone(), RoundRobinChooser::new());
        assert!(lb.is_weighted());

        backends[2].set_healthy(false);
        set.refresh_healthy();
        lb.refresh();
        assert!(lb.is_weighted());
        for _ in 0..30 {
            assert_ne!(lb.choose_host(None).unwrap().address(), backends[2].address());
        }

        // The remaining weights 1 and 2 still differ; drop one more and the
        // scheduler goes away.
        backends[1].set_healthy(false);
        set.refresh_healthy();
        lb.refresh();
        assert!(!lb.is_weighted());
        assert_eq!(lb.choose_host(None).unwrap().address(), backends[0].address());
    }

    #[test]
    fn test_heavy_host_marked_down_before_refresh() {
        let (backends, set) = weighted(&[1, 3]);
        let lb = EdfLoadBalancer::new(set.clone(), RoundRobinChooser::new());

        // The heavy host holds consecutive deadlines; no refresh happens here.
        backends[1].set_healthy(false);
        for _ in 0..1000 {
            assert_eq!(lb.choose_host(None).unwrap().address(), backends[0].address());
        }

        backends[0].set_healthy(false);
        assert!(lb.choose_host(None).is_none());
        assert!(lb.is_weighted());
    }

    #[test]
    fn test_custom_host_weight() {
        let (backends, set) = weighted(&[1, 1]);
        // Favour the second host regardless of configuration.
        let favour = backends[1].address();
        let lb = EdfLoadBalancer::with_host_weight(set, RoundRobinChooser::new(), move |h: &dyn Host| {
            if h.address() == favour {
                4
            } else {
                1
            }
        });
        assert!(lb.is_weighted());

        let hits = (0..500)
            .filter(|_| lb.choose_host(None).unwrap().address() == favour)
            .count();
        assert_eq!(hits, 400);
    }

    #[test]
    fn test_no_healthy_hosts() {
        let (backends, set) = weighted(&[1, 1]);
        for b in &backends {
            b.set_healthy(false);
        }
        set.refresh_healthy();
        let lb = EdfLoadBalancer::new(set, RoundRobinChooser::new());
        assert!(lb.choose_host(None).is_none());
        assert_eq!(lb.host_num(None), 2);
    }
}
