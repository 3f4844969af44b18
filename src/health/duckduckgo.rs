use crate::health::{HealthCheckResult, HealthChecker, ServiceStatus};
use crate::search::SearchClient;
use crate::types::Result;
use crate::utils::http::request_timeout;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs one keyless search and counts the results.
pub struct DuckDuckGoHealthChecker {
    search: Arc<dyn SearchClient>,
    timeout: Duration,
    max_results: usize,
}

impl DuckDuckGoHealthChecker {
    #[cfg(feature = "duckduckgo")]
    pub fn new(timeout_secs: f64) -> Result<Self> {
        Self::with_client(
            Arc::new(crate::search::duckduckgo::DuckDuckGoSearch::new()),
            timeout_secs,
        )
    }

    /// Check through an existing search client
    pub fn with_client(search: Arc<dyn SearchClient>, timeout_secs: f64) -> Result<Self> {
        Ok(Self {
            search,
            timeout: request_timeout(timeout_secs)?,
            max_results: 5,
        })
    }
}

#[async_trait]
impl HealthChecker for DuckDuckGoHealthChecker {
    fn name(&self) -> &str {
        "DuckDuckGo"
    }

    async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.search.search("test", self.max_results)).await;

        let result = match outcome {
            Err(_) => HealthCheckResult::new(
                ServiceStatus::Timeout,
                format!("DuckDuckGo search timed out after {:?}", self.timeout),
            ),
            Ok(Ok(hits)) if hits.is_empty() => {
                HealthCheckResult::new(ServiceStatus::Degraded, "DuckDuckGo search returned no results")
                    .with_detail("result_count", 0)
            }
            Ok(Ok(hits)) => HealthCheckResult::new(ServiceStatus::Healthy, "DuckDuckGo search is operational")
                .with_detail("result_count", hits.len()),
            Ok(Err(e)) => HealthCheckResult::from_error("DuckDuckGo", &e),
        };
        result.with_elapsed(started)
    }
}
