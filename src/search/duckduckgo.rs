//! DuckDuckGo search backend using daedra
//!
//! Keyless, so it doubles as the fallback backend for local runs and the
//! target of the DuckDuckGo health check.

use crate::search::{SearchClient, SearchHit};
use crate::types::{AppError, Result};
use async_trait::async_trait;

/// Web search powered by daedra
pub struct DuckDuckGoSearch;

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: max_results,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| AppError::Unavailable(format!("DuckDuckGo search failed: {}", e)))?;

        Ok(response
            .data
            .iter()
            .take(max_results)
            .map(|r| SearchHit {
                url: r.url.to_string(),
                title: r.title.to_string(),
                snippet: r.description.to_string(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}
