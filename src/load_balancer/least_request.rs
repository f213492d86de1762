//! Least active request load balancing strategy.
//!
//! Weighted hosts go through the EDF base strategy. With uniform weights the
//! balancer samples `choice` healthy hosts at random (with replacement) and
//! keeps the one with the fewest in-flight requests: the "power of two
//! choices" when `choice == 2`.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;

use crate::load_balancer::host_set::HostSet;
use crate::load_balancer::weighted::{EdfLoadBalancer, UnweightedChooser};
use crate::load_balancer::{HostRef, LoadBalancer, LoadBalancerContext, MetadataMatchCriteria};

/// Default number of sampled candidates.
pub const DEFAULT_CHOICE_COUNT: usize = 2;

/// Samples `choice` hosts and keeps the least loaded one.
#[derive(Debug, Clone, Copy)]
pub struct PowerOfChoices {
    choice: usize,
}

impl PowerOfChoices {
    /// A choice count of zero is raised to one.
    pub fn new(choice: usize) -> Self {
        Self {
            choice: choice.max(1),
        }
    }

    pub fn choice(&self) -> usize {
        self.choice
    }
}

impl Default for PowerOfChoices {
    fn default() -> Self {
        Self::new(DEFAULT_CHOICE_COUNT)
    }
}

impl UnweightedChooser for PowerOfChoices {
    fn choose(
        &self,
        _context: Option<&LoadBalancerContext>,
        healthy_hosts: &[HostRef],
        rng: &Mutex<StdRng>,
    ) -> Option<HostRef> {
        match healthy_hosts {
            [] => None,
            [only] => only.health().then(|| Arc::clone(only)),
            _ => {
                let mut rng = rng.lock();
                let mut candidate = sample_healthy(healthy_hosts, &mut *rng)?;
                for _ in 1..self.choice {
                    let Some(sample) = sample_healthy(healthy_hosts, &mut *rng) else {
                        break;
                    };
                    if sample.stats().active_request_count() < candidate.stats().active_request_count() {
                        candidate = sample;
                    }
                }
                Some(Arc::clone(candidate))
            }
        }
    }
}

/// Draw a random index and probe forward to the first host that is still
/// healthy. `None` once every host in the list has gone down.
fn sample_healthy<'a>(hosts: &'a [HostRef], rng: &mut StdRng) -> Option<&'a HostRef> {
    let len = hosts.len();
    let start = rng.gen_range(0..len);
    (0..len).map(|i| &hosts[(start + i) % len]).find(|host| host.health())
}

/// Picks the host with the fewest active requests among a random sample.
#[derive(Debug)]
pub struct LeastActiveRequestLoadBalancer {
    inner: EdfLoadBalancer,
    choice: usize,
}

impl LeastActiveRequestLoadBalancer {
    pub fn new(hosts: Arc<dyn HostSet>) -> Self {
        Self::with_choice(hosts, DEFAULT_CHOICE_COUNT)
    }

    pub fn with_choice(hosts: Arc<dyn HostSet>, choice: usize) -> Self {
        let chooser = PowerOfChoices::new(choice);
        Self {
            inner: EdfLoadBalancer::new(hosts, chooser),
            choice: chooser.choice(),
        }
    }

    /// Replace the sampling random source (deterministic tests).
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            inner: self.inner.with_rng(rng),
            choice: self.choice,
        }
    }

    pub fn choice(&self) -> usize {
        self.choice
    }

    /// Whether weighted (EDF) selection is active.
    pub fn is_weighted(&self) -> bool {
        self.inner.is_weighted()
    }
}

impl LoadBalancer for LeastActiveRequestLoadBalancer {
    fn choose_host(&self, context: Option<&LoadBalancerContext>) -> Option<HostRef> {
        self.inner.choose_host(context)
    }

    fn host_num(&self, metadata: Option<&MetadataMatchCriteria>) -> usize {
        self.inner.host_num(metadata)
    }

    fn has_hosts(&self, metadata: Option<&MetadataMatchCriteria>) -> bool {
        self.inner.has_hosts(metadata)
    }

    fn refresh(&self) {
        self.inner.refresh();
    }
}
