//! Research Orchestration
//!
//! Turns a topic into a cited [`Article`](crate::types::Article):
//!
//! 1. [`perspectives`] - survey related topics and extract N personas plus the baseline
//! 2. [`conversation`] - one asker/answerer dialog per perspective, run concurrently
//! 3. [`outline`] - draft an outline from the topic, refine it against the transcripts
//! 4. [`writer`] - retrieve references per outline node and write cited prose
//! 5. [`polish`] - remove cross-section duplication and write the lead summary
//!
//! [`ResearchCoordinator`] wires the stages together and owns the run-level
//! cancellation token. Every stage receives a shared [`ResearchContext`].

pub mod citations;
pub mod conversation;
pub mod coordinator;
pub mod outline;
pub mod perspectives;
pub mod polish;
mod render;
pub mod writer;

pub use conversation::{ConversationEngine, FinishReason, Transcript};
pub use coordinator::ResearchCoordinator;
pub use outline::OutlineTree;
pub use outline::OutlineSynthesizer;
pub use perspectives::PerspectiveDiscovery;
pub use polish::Polisher;
pub use writer::SectionWriter;

use crate::llm::{LLMClient, RetryPolicy};
use crate::search::{SearchClient, SearchHit, SourcePolicy};
use crate::store::ReferenceStore;
use crate::types::Result;
use crate::utils::toml_config::ResearchConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// System prompts, one per role the language model plays.
pub mod roles {
    pub const TOPIC_SCOUT: &str =
        "You are an experienced encyclopedia editor who knows which related articles are worth studying.";
    pub const PERSONA_EDITOR: &str =
        "You select a group of distinct editors who will each research a topic from their own angle.";
    pub const ASKER: &str =
        "You are a curious writer interviewing a topic expert to gather material for an encyclopedia article.";
    pub const QUERY_WRITER: &str =
        "You turn a question into short web search queries.";
    pub const ANSWERER: &str =
        "You are a topic expert who answers strictly from the numbered sources provided and cites them.";
    pub const OUTLINER: &str =
        "You organise encyclopedia articles into clear hierarchical outlines.";
    pub const SECTION_WRITER: &str =
        "You write one encyclopedia section from the numbered sources provided and cite them inline.";
    pub const POLISHER: &str =
        "You are a copy editor who removes repeated statements without changing citations.";
    pub const LEAD_WRITER: &str =
        "You write the concise lead paragraph that opens an encyclopedia article.";
}

/// Shared collaborators and settings for one research run.
///
/// Cheap to clone; every field is either an `Arc` or a small value.
#[derive(Clone)]
pub struct ResearchContext {
    pub llm: Arc<dyn LLMClient>,
    pub search: Arc<dyn SearchClient>,
    pub store: Arc<ReferenceStore>,
    pub policy: SourcePolicy,
    pub retry: RetryPolicy,
    pub settings: ResearchConfig,
    /// Results requested per search query
    pub max_results: usize,
    pub cancel: CancellationToken,
}

impl ResearchContext {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        search: Arc<dyn SearchClient>,
        store: Arc<ReferenceStore>,
        settings: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            search,
            store,
            policy: SourcePolicy::default(),
            retry: RetryPolicy::default(),
            settings,
            max_results: 5,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// One language model call under the retry policy, aborted by run cancellation.
    pub async fn complete(&self, label: &str, prompt: &str, role_context: &str) -> Result<String> {
        let llm = self.llm.clone();
        self.retry
            .run(label, &self.cancel, || {
                let llm = llm.clone();
                async move { llm.complete(prompt, role_context).await }
            })
            .await
    }

    /// Like [`ResearchContext::complete`], but a started call always finishes;
    /// run cancellation only stops further retries.
    pub async fn complete_settled(&self, label: &str, prompt: &str, role_context: &str) -> Result<String> {
        let llm = self.llm.clone();
        self.retry
            .run_settled(label, &self.cancel, || {
                let llm = llm.clone();
                async move { llm.complete(prompt, role_context).await }
            })
            .await
    }

    /// One search call under the retry policy, aborted by run cancellation.
    pub async fn web_search(&self, label: &str, query: &str) -> Result<Vec<SearchHit>> {
        let search = self.search.clone();
        let max_results = self.max_results;
        self.retry
            .run(label, &self.cancel, || {
                let search = search.clone();
                async move { search.search(query, max_results).await }
            })
            .await
    }

    /// Search counterpart of [`ResearchContext::complete_settled`].
    pub async fn web_search_settled(&self, label: &str, query: &str) -> Result<Vec<SearchHit>> {
        let search = self.search.clone();
        let max_results = self.max_results;
        self.retry
            .run_settled(label, &self.cancel, || {
                let search = search.clone();
                async move { search.search(query, max_results).await }
            })
            .await
    }
}

/// Parse a model's list reply into clean items.
///
/// Strips numbering (`1.`, `2)`), bullets and surrounding quotes; drops blank lines.
pub(crate) fn parse_list(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            strip_numbering(line.trim())
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// `12. Item` and `3) Item` lose their number; `2022 Winter Olympics` keeps it.
fn strip_numbering(line: &str) -> &str {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    match line[digits..].chars().next() {
        Some('.') | Some(')') if digits > 0 => &line[digits + 1..],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_strips_numbering_and_bullets() {
        let items = parse_list("1. Alpine skiing\n2) \"Figure skating\"\n\n- Curling\n* Biathlon\n");
        assert_eq!(items, vec!["Alpine skiing", "Figure skating", "Curling", "Biathlon"]);
    }

    #[test]
    fn test_parse_list_keeps_leading_years() {
        let items = parse_list("1. 2018 Winter Olympics
2022 Winter Paralympics");
        assert_eq!(items, vec!["2018 Winter Olympics", "2022 Winter Paralympics"]);
    }
}
