//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → ClusterManager::from_config builds clusters and load balancers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_str, ConfigError};
pub use schema::ClusterConfig;
pub use schema::HostConfig;
pub use schema::LoadBalancerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use validation::ValidationError;
