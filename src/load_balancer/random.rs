//! Random load balancing strategy.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::host_set::HostSet;
use crate::load_balancer::{HostRef, LoadBalancer, LoadBalancerContext, MetadataMatchCriteria};

/// Picks a uniformly random start index and probes forward for a healthy host.
#[derive(Debug)]
pub struct RandomLoadBalancer {
    hosts: Arc<dyn HostSet>,
    rng: Mutex<StdRng>,
}

impl RandomLoadBalancer {
    pub fn new(hosts: Arc<dyn HostSet>) -> Self {
        Self::with_rng(hosts, StdRng::from_entropy())
    }

    pub fn with_rng(hosts: Arc<dyn HostSet>, rng: StdRng) -> Self {
        Self {
            hosts,
            rng: Mutex::new(rng),
        }
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn choose_host(&self, _context: Option<&LoadBalancerContext>) -> Option<HostRef> {
        let targets = self.hosts.hosts();
        let total = targets.len();
        if total == 0 {
            return None;
        }

        let mut rng = self.rng.lock();
        let start = rng.gen_range(0..total);
        (0..total)
            .map(|i| &targets[(start + i) % total])
            .find(|host| host.health())
            .cloned()
    }

    fn host_num(&self, _metadata: Option<&MetadataMatchCriteria>) -> usize {
        self.hosts.hosts().len()
    }
}
