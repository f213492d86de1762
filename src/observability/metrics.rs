//! Metrics collection.
//!
//! # Metrics
//! - `upstream_lb_choose_total` (counter): selections by cluster, outcome
//! - `upstream_lb_refresh_total` (counter): load balancer refreshes by cluster
//! - `upstream_lb_hosts` (gauge): host count by cluster, state (total/healthy)

/// Record one `choose_host` outcome.
pub fn record_choose(cluster: &str, chosen: bool) {
    let outcome = if chosen { "chosen" } else { "no_host" };
    ::metrics::counter!(
        "upstream_lb_choose_total",
        "cluster" => cluster.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a load balancer refresh.
pub fn record_refresh(cluster: &str) {
    ::metrics::counter!("upstream_lb_refresh_total", "cluster" => cluster.to_string()).increment(1);
}

/// Record the current host counts of a cluster.
pub fn record_hosts(cluster: &str, total: usize, healthy: usize) {
    ::metrics::gauge!("upstream_lb_hosts", "cluster" => cluster.to_string(), "state" => "total")
        .set(total as f64);
    ::metrics::gauge!("upstream_lb_hosts", "cluster" => cluster.to_string(), "state" => "healthy")
        .set(healthy as f64);
}
