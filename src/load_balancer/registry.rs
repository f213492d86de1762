//! Load balancer policy registry.
//!
//! # Responsibilities
//! - Map policy identifiers to constructors
//! - Register the built-in policies
//! - Let embedding applications add or override policies at runtime
//! - Fall back to round robin for unknown policies

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::LoadBalancerConfig;
use crate::load_balancer::host_set::HostSet;
use crate::load_balancer::least_request::LeastActiveRequestLoadBalancer;
use crate::load_balancer::random::RandomLoadBalancer;
use crate::load_balancer::round_robin::{RoundRobinChooser, RoundRobinFactory};
use crate::load_balancer::weighted::EdfLoadBalancer;
use crate::load_balancer::{LoadBalancer, LoadBalancerType};

/// Builds a load balancer over a host set.
pub type LoadBalancerConstructor =
    Arc<dyn Fn(Arc<dyn HostSet>, &LoadBalancerConfig) -> Arc<dyn LoadBalancer> + Send + Sync>;

/// Policy type → constructor table.
///
/// Construct once and share by reference; registration may race with lookups.
pub struct LoadBalancerRegistry {
    constructors: DashMap<LoadBalancerType, LoadBalancerConstructor>,
    round_robin: Arc<RoundRobinFactory>,
}

impl LoadBalancerRegistry {
    /// Create a registry with the built-in policies registered.
    pub fn new() -> Self {
        Self::with_round_robin_factory(RoundRobinFactory::new())
    }

    /// Like [`new`](Self::new), with a caller-supplied factory for round-robin offsets.
    pub fn with_round_robin_factory(factory: RoundRobinFactory) -> Self {
        let registry = Self {
            constructors: DashMap::new(),
            round_robin: Arc::new(factory),
        };

        let rr = Arc::clone(&registry.round_robin);
        registry.register(LoadBalancerType::ROUND_ROBIN, move |hosts, _| {
            Arc::new(rr.build(hosts))
        });
        registry.register(LoadBalancerType::RANDOM, |hosts, _| {
            Arc::new(RandomLoadBalancer::new(hosts))
        });
        registry.register(LoadBalancerType::LEAST_ACTIVE_REQUEST, |hosts, config| {
            Arc::new(LeastActiveRequestLoadBalancer::with_choice(hosts, config.choice_count))
        });
        registry.register(LoadBalancerType::WEIGHTED_ROUND_ROBIN, |hosts, _| {
            Arc::new(EdfLoadBalancer::new(hosts, RoundRobinChooser::new()))
        });
        registry
    }

    /// Store (or overwrite) the constructor for a policy.
    pub fn register<F>(&self, policy: LoadBalancerType, constructor: F)
    where
        F: Fn(Arc<dyn HostSet>, &LoadBalancerConfig) -> Arc<dyn LoadBalancer> + Send + Sync + 'static,
    {
        tracing::debug!(policy = %policy, "Registering load balancer policy");
        self.constructors.insert(policy, Arc::new(constructor));
    }

    /// Build a load balancer for `policy` with default tuning.
    pub fn build(&self, policy: &LoadBalancerType, hosts: Arc<dyn HostSet>) -> Arc<dyn LoadBalancer> {
        let config = LoadBalancerConfig {
            policy: policy.clone(),
            ..LoadBalancerConfig::default()
        };
        self.build_with_config(&config, hosts)
    }

    /// Build a load balancer for the configured policy.
    ///
    /// Unknown policies degrade to round robin; this is not an error.
    pub fn build_with_config(&self, config: &LoadBalancerConfig, hosts: Arc<dyn HostSet>) -> Arc<dyn LoadBalancer> {
        // Clone out of the map so the shard lock is released before constructing.
        let constructor = self
            .constructors
            .get(&config.policy)
            .map(|entry| Arc::clone(entry.value()));

        match constructor {
            Some(constructor) => constructor(hosts, config),
            None => {
                tracing::debug!(policy = %config.policy, "Unknown load balancer policy, using round robin");
                Arc::new(self.round_robin.build(hosts))
            }
        }
    }

    pub fn is_registered(&self, policy: &LoadBalancerType) -> bool {
        self.constructors.contains_key(policy)
    }

    /// Registered policies, sorted.
    pub fn policies(&self) -> Vec<LoadBalancerType> {
        let mut policies: Vec<_> = self.constructors.iter().map(|e| e.key().clone()).collect();
        policies.sort();
        policies
    }
}

impl Default for LoadBalancerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadBalancerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalancerRegistry")
            .field("policies", &self.policies())
            .finish()
    }
}
