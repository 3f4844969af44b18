//! Connectivity checks for the external services
//!
//! Each checker makes one cheap request and classifies the outcome; checkers
//! never return errors, every failure mode maps onto a [`ServiceStatus`].
//! [`check_all`] runs a set of checkers concurrently, which is what the
//! `stormer check` command and the `--preflight` run option use.

pub mod duckduckgo;
pub mod openrouter;
pub mod tavily;

pub use duckduckgo::DuckDuckGoHealthChecker;
pub use openrouter::OpenRouterHealthChecker;
pub use tavily::TavilyHealthChecker;

use crate::types::AppError;
use crate::utils::toml_config::{SearchProvider, Secrets, StormerConfig};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    AuthenticationFailed,
    Timeout,
    Unknown,
}

impl ServiceStatus {
    /// Healthy or degraded services can still serve a run.
    pub fn is_usable(&self) -> bool {
        matches!(self, ServiceStatus::Healthy | ServiceStatus::Degraded)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Healthy => "HEALTHY",
            ServiceStatus::Degraded => "DEGRADED",
            ServiceStatus::Unhealthy => "UNHEALTHY",
            ServiceStatus::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ServiceStatus::Timeout => "TIMEOUT",
            ServiceStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: ServiceStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    pub fn new(status: ServiceStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            response_time_ms: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_elapsed(mut self, started: Instant) -> Self {
        self.response_time_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Classify a gateway error.
    pub fn from_error(service: &str, err: &AppError) -> Self {
        let status = match err {
            AppError::Authentication(_) => ServiceStatus::AuthenticationFailed,
            AppError::RateLimited(_) => ServiceStatus::Degraded,
            AppError::Timeout(_) => ServiceStatus::Timeout,
            AppError::Unavailable(_) | AppError::Network(_) | AppError::InvalidInput(_) => {
                ServiceStatus::Unhealthy
            }
            _ => ServiceStatus::Unknown,
        };
        Self::new(status, format!("{}: {}", service, err))
    }
}

/// One external service's connectivity check
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Service name for display
    fn name(&self) -> &str;

    async fn check_health(&self) -> HealthCheckResult;
}

/// Run all checkers concurrently. Results keep the input order.
pub async fn check_all(checkers: &[Arc<dyn HealthChecker>]) -> Vec<(String, HealthCheckResult)> {
    let results = join_all(checkers.iter().map(|c| c.check_health())).await;
    checkers
        .iter()
        .zip(results)
        .map(|(checker, result)| {
            tracing::debug!(service = checker.name(), status = %result.status, "Health check finished");
            (checker.name().to_string(), result)
        })
        .collect()
}

/// Stands in for a checker whose service has no API key configured.
pub struct MissingCredentials {
    name: &'static str,
    variable: &'static str,
}

#[async_trait]
impl HealthChecker for MissingCredentials {
    fn name(&self) -> &str {
        self.name
    }

    async fn check_health(&self) -> HealthCheckResult {
        HealthCheckResult::new(
            ServiceStatus::AuthenticationFailed,
            format!("{} is not set", self.variable),
        )
    }
}

/// Checkers for the language model service and the configured search backend.
pub fn checkers_from_config(config: &StormerConfig, secrets: &Secrets) -> Vec<Arc<dyn HealthChecker>> {
    let mut checkers: Vec<Arc<dyn HealthChecker>> = Vec::new();

    let openrouter = secrets.openrouter_api_key.clone().and_then(|key| {
        OpenRouterHealthChecker::new(key, config.openrouter.base_url.clone(), config.openrouter.timeout)
            .map_err(|e| tracing::warn!(error = %e, "Could not build OpenRouter checker"))
            .ok()
    });
    checkers.push(match openrouter {
        Some(checker) => Arc::new(checker),
        None => Arc::new(MissingCredentials {
            name: "OpenRouter",
            variable: "OPENROUTER_API_KEY",
        }),
    });

    match config.search.provider {
        SearchProvider::Tavily => {
            let tavily = secrets.tavily_api_key.clone().and_then(|key| {
                TavilyHealthChecker::new(key, config.tavily.base_url.clone(), config.tavily.timeout)
                    .map_err(|e| tracing::warn!(error = %e, "Could not build Tavily checker"))
                    .ok()
            });
            checkers.push(match tavily {
                Some(checker) => Arc::new(checker),
                None => Arc::new(MissingCredentials {
                    name: "Tavily",
                    variable: "TAVILY_API_KEY",
                }),
            });
        }
        #[cfg(feature = "duckduckgo")]
        SearchProvider::DuckDuckGo => {
            match DuckDuckGoHealthChecker::new(config.tavily.timeout) {
                Ok(checker) => checkers.push(Arc::new(checker)),
                Err(e) => tracing::warn!(error = %e, "Could not build DuckDuckGo checker"),
            }
        }
        #[cfg(not(feature = "duckduckgo"))]
        SearchProvider::DuckDuckGo => {
            tracing::warn!("DuckDuckGo search is configured but the 'duckduckgo' feature is disabled");
        }
    }

    checkers
}
