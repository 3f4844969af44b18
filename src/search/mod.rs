//! Search Gateway
//!
//! Query to ranked web results. Two backends are provided:
//!
//! - [`tavily::TavilySearch`] - Tavily search API (requires `TAVILY_API_KEY`)
//! - [`duckduckgo::DuckDuckGoSearch`] - keyless DuckDuckGo search via `daedra`
//!   (feature `duckduckgo`)
//!
//! Results are filtered through [`policy::SourcePolicy`] before anything is
//! stored as a reference.

#[cfg(feature = "duckduckgo")]
pub mod duckduckgo;
pub mod policy;
pub mod tavily;

use crate::types::{AppError, Result};
use crate::utils::toml_config::{SearchProvider, Secrets, StormerConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use policy::SourcePolicy;

/// One ranked web result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Search backend abstraction
///
/// Failures follow the same taxonomy as the language model gateway; an empty
/// result list is a valid, non-error outcome.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Build the configured search backend
pub fn create_search_client(config: &StormerConfig, secrets: &Secrets) -> Result<Arc<dyn SearchClient>> {
    match config.search.provider {
        SearchProvider::Tavily => {
            let api_key = secrets.tavily_api_key.clone().ok_or_else(|| {
                AppError::Configuration(
                    "TAVILY_API_KEY is required. Please set it in your .env file or environment."
                        .to_string(),
                )
            })?;
            Ok(Arc::new(tavily::TavilySearch::new(
                api_key,
                config.tavily.base_url.clone(),
                config.tavily.timeout,
            )?))
        }
        #[cfg(feature = "duckduckgo")]
        SearchProvider::DuckDuckGo => Ok(Arc::new(duckduckgo::DuckDuckGoSearch::new())),
        #[cfg(not(feature = "duckduckgo"))]
        SearchProvider::DuckDuckGo => Err(AppError::Configuration(
            "DuckDuckGo search requires the 'duckduckgo' feature".to_string(),
        )),
    }
}
