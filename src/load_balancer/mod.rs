//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Cluster configured with a policy type
//!     → registry.rs (policy type → constructor, round robin fallback)
//!     → strategy built over the cluster's HostSet:
//!         - random.rs (uniform start, probe for a healthy host)
//!         - round_robin.rs (atomic rotation over all hosts)
//!         - weighted.rs (EDF scheduler when weights differ)
//!         - least_request.rs (power of d choices on live requests)
//!     → choose_host() once per outbound request
//!     → Host, or None when nothing is eligible
//! ```
//!
//! # Design Decisions
//! - Strategies never mutate the HostSet; they read one snapshot per call
//! - Only derived scheduling state is cached, and rebuilt on refresh()
//! - Random sources live behind their own mutex; rotation is lock-free
//! - "No host" is a normal outcome (`None`), never a panic

pub mod edf;
pub mod host;
pub mod host_set;
pub mod least_request;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod weighted;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use host::{ActiveRequestGuard, Host, HostRef, HostStats, UpstreamHost};
pub use host_set::{ClusterHostSet, HostSet};
pub use least_request::LeastActiveRequestLoadBalancer;
pub use random::RandomLoadBalancer;
pub use registry::{LoadBalancerConstructor, LoadBalancerRegistry};
pub use round_robin::{RoundRobinFactory, RoundRobinLoadBalancer};
pub use weighted::EdfLoadBalancer;

/// Selects one upstream host per request.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Pick the host for the next request, or `None` when no host is eligible.
    fn choose_host(&self, context: Option<&LoadBalancerContext>) -> Option<HostRef>;

    /// Number of hosts in the full host list.
    ///
    /// The metadata criteria is accepted for interface uniformity; the
    /// built-in strategies do not filter on it.
    fn host_num(&self, metadata: Option<&MetadataMatchCriteria>) -> usize;

    /// Whether the full host list is non-empty.
    fn has_hosts(&self, metadata: Option<&MetadataMatchCriteria>) -> bool {
        self.host_num(metadata) > 0
    }

    /// Rebuild derived scheduling state after membership or health changed.
    fn refresh(&self) {}
}

/// Identifier of a load balancing policy.
///
/// Open-ended so embedding applications can register their own policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadBalancerType(Cow<'static, str>);

impl LoadBalancerType {
    pub const RANDOM: Self = Self(Cow::Borrowed("LB_RANDOM"));
    pub const ROUND_ROBIN: Self = Self(Cow::Borrowed("LB_ROUNDROBIN"));
    pub const LEAST_ACTIVE_REQUEST: Self = Self(Cow::Borrowed("LB_LEAST_REQUEST"));
    pub const WEIGHTED_ROUND_ROBIN: Self = Self(Cow::Borrowed("LB_WEIGHTED_ROUNDROBIN"));

    /// Create a custom policy identifier.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LoadBalancerType {
    fn default() -> Self {
        Self::ROUND_ROBIN
    }
}

impl fmt::Display for LoadBalancerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for LoadBalancerType {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for LoadBalancerType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Sorted key/value tags used for subset-aware host queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataMatchCriteria {
    criteria: BTreeMap<String, String>,
}

impl MetadataMatchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) one criterion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.criteria.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.criteria.get(key).map(String::as_str)
    }

    /// Criteria in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.criteria.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MetadataMatchCriteria
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            criteria: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Per-request routing context handed to `choose_host`.
///
/// Passed through untouched by the built-in strategies.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerContext {
    metadata_match: Option<MetadataMatchCriteria>,
}

impl LoadBalancerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata_match(mut self, criteria: MetadataMatchCriteria) -> Self {
        self.metadata_match = Some(criteria);
        self
    }

    pub fn metadata_match_criteria(&self) -> Option<&MetadataMatchCriteria> {
        self.metadata_match.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_type_round_trips_through_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: LoadBalancerType,
        }

        let w: Wrapper = toml::from_str(r#"policy = "LB_LEAST_REQUEST""#).unwrap();
        assert_eq!(w.policy, LoadBalancerType::LEAST_ACTIVE_REQUEST);

        let custom: Wrapper = toml::from_str(r#"policy = "LB_MAGLEV""#).unwrap();
        assert_eq!(custom.policy.as_str(), "LB_MAGLEV");
    }

    #[test]
    fn test_metadata_criteria_sorted() {
        let criteria: MetadataMatchCriteria = [("zone", "b"), ("version", "v2")].into_iter().collect();
        let keys: Vec<_> = criteria.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["version", "zone"]);

        let ctx = LoadBalancerContext::new().with_metadata_match(criteria.with("zone", "a"));
        assert_eq!(ctx.metadata_match_criteria().and_then(|c| c.get("zone")), Some("a"));
    }
}
