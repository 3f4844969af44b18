use crate::health::{HealthCheckResult, HealthChecker, ServiceStatus};
use crate::types::{AppError, Result};
use crate::utils::http::{check_status, request_timeout};
use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

/// Runs a one-result search against the Tavily API.
pub struct TavilyHealthChecker {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TavilyHealthChecker {
    pub fn new(api_key: String, base_url: String, timeout_secs: f64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout(timeout_secs)?)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ping(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&json!({
                "api_key": self.api_key,
                "query": "test",
                "max_results": 1,
            }))
            .send()
            .await?;

        let response = check_status("Tavily", response).await?;

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| AppError::Unavailable(format!("malformed response from /search: {}", e)))
    }
}

#[async_trait]
impl HealthChecker for TavilyHealthChecker {
    fn name(&self) -> &str {
        "Tavily"
    }

    async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        let result = match self.ping().await {
            Ok(body) => {
                let has_answer = body
                    .get("answer")
                    .map(|a| !a.is_null() && a.as_str().map_or(true, |s| !s.is_empty()))
                    .unwrap_or(false);
                HealthCheckResult::new(ServiceStatus::Healthy, "Tavily API is operational")
                    .with_detail("has_answer", has_answer)
            }
            Err(e) => HealthCheckResult::from_error("Tavily", &e),
        };
        result.with_elapsed(started)
    }
}
