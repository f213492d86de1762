//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::host_set::HostSet;
use crate::load_balancer::weighted::UnweightedChooser;
use crate::load_balancer::{HostRef, LoadBalancer, LoadBalancerContext, MetadataMatchCriteria};

/// Builds round-robin balancers with randomized starting offsets,
/// so clusters sharing a host list do not all start at index 0.
#[derive(Debug)]
pub struct RoundRobinFactory {
    rng: Mutex<StdRng>,
}

impl RoundRobinFactory {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn build(&self, hosts: Arc<dyn HostSet>) -> RoundRobinLoadBalancer {
        let total = hosts.hosts().len();
        let offset = if total == 0 {
            0
        } else {
            let value: u32 = self.rng.lock().gen();
            (value as usize % total) as u32
        };
        RoundRobinLoadBalancer::with_offset(hosts, offset)
    }
}

impl Default for RoundRobinFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Round-robin selector over the full host list, skipping unhealthy hosts.
#[derive(Debug)]
pub struct RoundRobinLoadBalancer {
    hosts: Arc<dyn HostSet>,
    rr_index: AtomicU32,
}

impl RoundRobinLoadBalancer {
    /// The counter is incremented before use, so the first selection lands
    /// on `(offset + 1) % total`.
    pub fn with_offset(hosts: Arc<dyn HostSet>, offset: u32) -> Self {
        Self {
            hosts,
            rr_index: AtomicU32::new(offset),
        }
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn choose_host(&self, _context: Option<&LoadBalancerContext>) -> Option<HostRef> {
        let targets = self.hosts.hosts();
        let total = targets.len();
        if total == 0 {
            return None;
        }

        next_healthy(&self.rr_index, &targets)
    }

    fn host_num(&self, _metadata: Option<&MetadataMatchCriteria>) -> usize {
        self.hosts.hosts().len()
    }
}

/// Unweighted chooser that rotates through the healthy hosts.
#[derive(Debug, Default)]
pub struct RoundRobinChooser {
    rr_index: AtomicU32,
}

impl RoundRobinChooser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnweightedChooser for RoundRobinChooser {
    fn choose(
        &self,
        _context: Option<&LoadBalancerContext>,
        healthy_hosts: &[HostRef],
        _rng: &Mutex<StdRng>,
    ) -> Option<HostRef> {
        // The list may predate a health flip; recheck each candidate.
        next_healthy(&self.rr_index, healthy_hosts)
    }
}

/// Advance `counter` up to `hosts.len()` times and return the first healthy
/// host it lands on. Each probe takes its own ticket, so concurrent callers
/// never share an index.
fn next_healthy(counter: &AtomicU32, hosts: &[HostRef]) -> Option<HostRef> {
    let total = u32::try_from(hosts.len()).ok().filter(|t| *t > 0)?;
    (0..total)
        .map(|_| counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % total)
        .map(|index| &hosts[index as usize])
        .find(|host| host.health())
        .cloned()
}
