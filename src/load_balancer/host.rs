//! Upstream host abstraction.
//!
//! # Responsibilities
//! - Describe what a load balancer may read from a host
//! - Track live requests per host (for least-active-request selection)
//! - Provide an in-process host with an externally flipped health flag

use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Read-only view of one upstream endpoint.
///
/// Health and stats are owned by the cluster side; load balancers only read them.
pub trait Host: Send + Sync + fmt::Debug {
    fn address(&self) -> SocketAddr;

    /// Logical host name, empty when unset.
    fn hostname(&self) -> &str {
        ""
    }

    fn health(&self) -> bool;

    /// Static weight for the current refresh cycle.
    fn weight(&self) -> u32;

    fn stats(&self) -> &HostStats;
}

/// A shared reference to a host.
pub type HostRef = Arc<dyn Host>;

/// Per-host request counters.
#[derive(Debug, Default)]
pub struct HostStats {
    /// Requests currently in flight.
    upstream_request_active: AtomicI64,
    /// Requests ever started.
    upstream_request_total: AtomicU64,
}

impl HostStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of in-flight requests.
    pub fn active_request_count(&self) -> i64 {
        self.upstream_request_active.load(Ordering::Relaxed)
    }

    /// Total number of requests started against this host.
    pub fn request_total(&self) -> u64 {
        self.upstream_request_total.load(Ordering::Relaxed)
    }

    /// Record a request start.
    pub fn inc_active(&self) {
        self.upstream_request_active.fetch_add(1, Ordering::Relaxed);
        self.upstream_request_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request completion.
    pub fn dec_active(&self) {
        self.upstream_request_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An upstream host known to this process.
#[derive(Debug)]
pub struct UpstreamHost {
    address: SocketAddr,
    hostname: String,
    weight: u32,
    healthy: AtomicBool,
    stats: HostStats,
}

impl UpstreamHost {
    /// Create a healthy host with the given weight.
    pub fn new(address: SocketAddr, weight: u32) -> Self {
        Self {
            address,
            hostname: String::new(),
            weight,
            healthy: AtomicBool::new(true),
            stats: HostStats::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Update the health flag (driven by health checking).
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }
}

impl Host for UpstreamHost {
    fn address(&self) -> SocketAddr {
        self.address
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn health(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn stats(&self) -> &HostStats {
        &self.stats
    }
}

/// A RAII guard that counts one in-flight request against a host.
///
/// The live-request counter is incremented on creation and decremented on drop.
#[derive(Debug)]
pub struct ActiveRequestGuard {
    host: HostRef,
}

impl ActiveRequestGuard {
    pub fn new(host: HostRef) -> Self {
        host.stats().inc_active();
        Self { host }
    }

    pub fn host(&self) -> &HostRef {
        &self.host
    }
}

impl Deref for ActiveRequestGuard {
    type Target = dyn Host;
    fn deref(&self) -> &Self::Target {
        self.host.as_ref()
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.host.stats().dec_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_request_guard() {
        let host: HostRef = Arc::new(UpstreamHost::new("127.0.0.1:8080".parse().unwrap(), 1));

        let g1 = ActiveRequestGuard::new(host.clone());
        let g2 = ActiveRequestGuard::new(host.clone());
        assert_eq!(host.stats().active_request_count(), 2);
        assert_eq!(g1.address(), host.address());

        drop(g1);
        assert_eq!(host.stats().active_request_count(), 1);
        drop(g2);
        assert_eq!(host.stats().active_request_count(), 0);
        assert_eq!(host.stats().request_total(), 2);
    }

    #[test]
    fn test_health_flag() {
        let host = UpstreamHost::new("127.0.0.1:8080".parse().unwrap(), 3).with_hostname("web-1");
        assert!(host.health());
        host.set_healthy(false);
        assert!(!host.health());
        assert_eq!(host.hostname(), "web-1");
        assert_eq!(host.weight(), 3);
    }
}
