use crate::health::{HealthCheckResult, HealthChecker, ServiceStatus};
use crate::types::{AppError, Result};
use crate::utils::http::{check_status, request_timeout};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;

/// Lists models, which verifies both reachability and the API key.
pub struct OpenRouterHealthChecker {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<serde_json::Value>,
}

impl OpenRouterHealthChecker {
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

    async fn fetch_models(&self) -> Result<usize> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let response = check_status("OpenRouter", response).await?;

        let body = response.text().await?;
        let models: ModelList = serde_json::from_str(&body)
            .map_err(|e| AppError::Unavailable(format!("malformed response from /models: {}", e)))?;
        Ok(models.data.len())
    }
}

#[async_trait]
impl HealthChecker for OpenRouterHealthChecker {
    fn name(&self) -> &str {
        "OpenRouter"
    }

    async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        let result = match self.fetch_models().await {
            Ok(count) => HealthCheckResult::new(ServiceStatus::Healthy, "OpenRouter API is operational")
                .with_detail("model_count", count),
            Err(e) => HealthCheckResult::from_error("OpenRouter", &e),
        };
        result.with_elapsed(started)
    }
}
