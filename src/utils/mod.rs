//! Configuration and shared helpers.

/// HTTP status classification shared by the gateways.
pub mod http;
/// TOML configuration with environment overrides.
pub mod toml_config;

pub use toml_config::{ConfigError, Secrets, StormerConfig};
