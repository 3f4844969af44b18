//! Mock implementations for testing.
//!
//! This module provides scripted language model and search gateways that
//! can be shared across test files. The language model routes on the role
//! context (the system prompt constants in `stormer::research::roles`) and
//! reads what it needs back out of the task prompt, so a whole research run
//! can be driven deterministically without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stormer::research::conversation::STOP_PHRASE;
use stormer::research::roles;
use stormer::store::canonical::canonical_url;
use stormer::types::{AppError, Result};
use stormer::utils::toml_config::ResearchConfig;
use stormer::{LLMClient, ReferenceStore, ResearchContext, SearchClient, SearchHit, SourcePolicy};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_OUTLINE: &str = "# Background\n# Venues\n## Beijing\n# Results";

/// One recorded language model call.
#[derive(Debug, Clone)]
pub struct Call {
    pub role: &'static str,
    pub prompt: String,
}

/// Scripted language model.
///
/// - asker: asks `Question <round> from <label>?` until `stop_after` says otherwise
/// - query writer: echoes the question as the single query
/// - answerer and section writer: cite `[1]` and `[2]`
/// - polisher: echoes the section it was given
/// - outliner: pops `outline_replies`, then falls back to `outline`
///
/// # Examples
///
/// ```ignore
/// let llm = MockLLMClient::new(&["Athlete", "Engineer"])
///     .stop_after("Engineer", 1)
///     .failing_role(roles::LEAD_WRITER);
/// ```
pub struct MockLLMClient {
    personas: Vec<String>,
    related: Vec<String>,
    stop_after: HashMap<String, usize>,
    outline: String,
    outline_replies: Mutex<VecDeque<String>>,
    failing_roles: HashSet<&'static str>,
    fatal_roles: HashSet<&'static str>,
    stray_citation_section: Option<String>,
    cancel_on_section: Option<(usize, CancellationToken)>,
    section_calls: AtomicUsize,
    failing_askers: HashSet<String>,
    panicking_askers: HashSet<String>,
    cancel_on_asker: Option<(usize, CancellationToken)>,
    asker_calls: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl MockLLMClient {
    /// Create a mock that proposes the given persona labels.
    pub fn new(personas: &[&str]) -> Self {
        Self {
            personas: personas.iter().map(|p| p.to_string()).collect(),
            related: vec!["Related topic A".to_string(), "Related topic B".to_string()],
            stop_after: HashMap::new(),
            outline: DEFAULT_OUTLINE.to_string(),
            outline_replies: Mutex::new(VecDeque::new()),
            failing_roles: HashSet::new(),
            fatal_roles: HashSet::new(),
            stray_citation_section: None,
            cancel_on_section: None,
            section_calls: AtomicUsize::new(0),
            failing_askers: HashSet::new(),
            panicking_askers: HashSet::new(),
            cancel_on_asker: None,
            asker_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The asker for `label` says the stop phrase once `rounds` rounds exist.
    pub fn stop_after(mut self, label: &str, rounds: usize) -> Self {
        self.stop_after.insert(label.to_string(), rounds);
        self
    }

    pub fn with_outline(mut self, outline: &str) -> Self {
        self.outline = outline.to_string();
        self
    }

    /// Outliner replies used, in order, before the default outline.
    pub fn with_outline_replies(self, replies: &[&str]) -> Self {
        self.outline_replies
            .lock()
            .extend(replies.iter().map(|r| r.to_string()));
        self
    }

    /// Every call in `role` (one of the `roles` constants) fails with `Unavailable`.
    pub fn failing_role(mut self, role: &str) -> Self {
        self.failing_roles.insert(role_name(role));
        self
    }

    /// Every call in `role` fails with `Authentication`.
    pub fn fatal_role(mut self, role: &str) -> Self {
        self.fatal_roles.insert(role_name(role));
        self
    }

    /// The section writer for sections whose title contains `title` also cites `[9]`.
    pub fn with_stray_citation(mut self, title: &str) -> Self {
        self.stray_citation_section = Some(title.to_string());
        self
    }

    /// Cancel `token` while serving the `n`th section writer call (1-based).
    pub fn cancel_on_section(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_section = Some((n, token));
        self
    }

    /// The asker for `label` fails with `Unavailable` on every call.
    pub fn failing_asker(mut self, label: &str) -> Self {
        self.failing_askers.insert(label.to_string());
        self
    }

    /// The asker for `label` panics.
    pub fn panicking_asker(mut self, label: &str) -> Self {
        self.panicking_askers.insert(label.to_string());
        self
    }

    /// Cancel `token` while serving the `n`th asker call (1-based).
    pub fn cancel_on_asker(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_asker = Some((n, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls made in `role`, one of the `roles` constants.
    pub fn calls_for(&self, role: &str) -> Vec<Call> {
        let name = role_name(role);
        self.calls
            .lock()
            .iter()
            .filter(|c| c.role == name)
            .cloned()
            .collect()
    }

    /// Asker calls made on behalf of the perspective labelled `label`.
    pub fn asker_calls_for(&self, label: &str) -> usize {
        let marker = format!("Your perspective: {}.", label);
        self.calls_for(roles::ASKER)
            .iter()
            .filter(|c| c.prompt.contains(&marker))
            .count()
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        let label = line_value(prompt, "Your perspective: ")
            .map(|rest| rest.split('.').next().unwrap_or_default().trim().to_string())
            .unwrap_or_default();
        if self.panicking_askers.contains(&label) {
            panic!("scripted asker panic for {}", label);
        }
        if self.failing_askers.contains(&label) {
            return Err(AppError::Unavailable(format!("No question from {}", label)));
        }

        let n = self.asker_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on_asker {
            if n == *at {
                token.cancel();
            }
        }

        let asked = prompt.lines().filter(|l| l.starts_with("Q: ")).count();
        Ok(match self.stop_after.get(&label) {
            Some(limit) if asked >= *limit => STOP_PHRASE.to_string(),
            _ => format!("Question: Question {} from {}?", asked + 1, label),
        })
    }

    fn write_section(&self, prompt: &str) -> String {
        let title = line_value(prompt, "Section: ").unwrap_or_default();
        let mut reply = format!("## {}\n{} is well documented [1]. Further detail follows [2].", title, title);

        if matches!(&self.stray_citation_section, Some(stray) if title.contains(stray.as_str())) {
            reply.push_str(" An unsupported claim [9].");
        }

        let n = self.section_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on_section {
            if n == *at {
                token.cancel();
            }
        }
        reply
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(&self, prompt: &str, role_context: &str) -> Result<String> {
        let role = role_name(role_context);
        self.calls.lock().push(Call {
            role,
            prompt: prompt.to_string(),
        });

        if self.fatal_roles.contains(role) {
            return Err(AppError::Authentication("Mock key rejected".to_string()));
        }
        if self.failing_roles.contains(role) {
            return Err(AppError::Unavailable("Mock LLM failure".to_string()));
        }

        let reply = match role {
            "topic_scout" => self.related.join("\n"),
            "persona_editor" => self
                .personas
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{}. {}: focuses on the topic as a {}", i + 1, p, p.to_lowercase()))
                .collect::<Vec<_>>()
                .join("\n"),
            "asker" => self.ask(prompt)?,
            "query_writer" => line_value(prompt, "Question: ").unwrap_or_default(),
            "answerer" => "The sources agree on the main facts [1]. Details differ slightly [1, 2].".to_string(),
            "outliner" => self
                .outline_replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.outline.clone()),
            "section_writer" => self.write_section(prompt),
            "polisher" => between(prompt, "\":\n", "\n\nRewrite the current section")
                .unwrap_or_default(),
            "lead_writer" => "A concise summary of the topic [1].".to_string(),
            _ => String::new(),
        };
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

fn role_name(role_context: &str) -> &'static str {
    match role_context {
        roles::TOPIC_SCOUT => "topic_scout",
        roles::PERSONA_EDITOR => "persona_editor",
        roles::ASKER => "asker",
        roles::QUERY_WRITER => "query_writer",
        roles::ANSWERER => "answerer",
        roles::OUTLINER => "outliner",
        roles::SECTION_WRITER => "section_writer",
        roles::POLISHER => "polisher",
        roles::LEAD_WRITER => "lead_writer",
        _ => "unknown",
    }
}

/// Remainder of the first line starting with `prefix`.
fn line_value(prompt: &str, prefix: &str) -> Option<String> {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix(prefix))
        .map(|v| v.trim().to_string())
}

/// Text of the current section inside a polish prompt.
fn between(prompt: &str, start: &str, end: &str) -> Option<String> {
    let current = prompt.find("Current section \"")?;
    let rest = &prompt[current..];
    let from = rest.find(start)? + start.len();
    let to = rest.find(end)?;
    (from <= to).then(|| rest[from..to].to_string())
}

/// Scripted search backend.
///
/// Each query returns two pages unique to the query, one page shared by
/// every query (so concurrent conversations race to insert the same source)
/// and one forum page the default source policy rejects.
#[derive(Default)]
pub struct MockSearchClient {
    empty_when: Vec<String>,
    fail_when: Vec<String>,
    served: Mutex<Vec<(String, Vec<SearchHit>)>>,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries containing `needle` return no results.
    pub fn empty_when(mut self, needle: &str) -> Self {
        self.empty_when.push(needle.to_string());
        self
    }

    /// Queries containing `needle` fail with `Unavailable`.
    pub fn fail_when(mut self, needle: &str) -> Self {
        self.fail_when.push(needle.to_string());
        self
    }

    /// Queries served so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.served.lock().iter().map(|(q, _)| q.clone()).collect()
    }

    /// Distinct canonical URLs of reliable hits handed out for queries other
    /// than table-of-contents lookups.
    pub fn conversation_urls(&self) -> HashSet<String> {
        let policy = SourcePolicy::default();
        self.served
            .lock()
            .iter()
            .filter(|(q, _)| !q.ends_with(" wikipedia"))
            .flat_map(|(_, hits)| hits.iter())
            .filter(|h| policy.is_reliable(h))
            .filter_map(|h| canonical_url(&h.url))
            .collect()
    }

    pub fn hits_for(query: &str) -> Vec<SearchHit> {
        let slug = slug(query);
        vec![
            SearchHit {
                url: format!("https://en.example.org/wiki/{}", slug),
                title: format!("{} - Encyclopedia", query),
                snippet: format!("Facts about {}: background, venues around Beijing and results.", query),
            },
            SearchHit {
                url: "https://www.example.org/shared/?utm_source=search".to_string(),
                title: "Shared overview".to_string(),
                snippet: "An overview of the background, the Beijing venues and the results.".to_string(),
            },
            SearchHit {
                url: format!("https://news.example.net/{}#coverage", slug),
                title: format!("Coverage of {}", query),
                snippet: format!("Reporting on {}.", query),
            },
            SearchHit {
                url: format!("https://www.reddit.com/r/{}", slug),
                title: "Forum thread".to_string(),
                snippet: "Someone said something.".to_string(),
            },
        ]
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        if self.fail_when.iter().any(|n| query.contains(n.as_str())) {
            return Err(AppError::Unavailable("Mock search failure".to_string()));
        }
        let hits: Vec<SearchHit> = if self.empty_when.iter().any(|n| query.contains(n.as_str())) {
            Vec::new()
        } else {
            Self::hits_for(query).into_iter().take(max_results).collect()
        };
        self.served.lock().push((query.to_string(), hits.clone()));
        Ok(hits)
    }

    fn name(&self) -> &str {
        "mock-search"
    }
}

fn slug(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Small, fast settings: `perspectives` personas, `rounds` rounds each.
pub fn settings(perspectives: usize, rounds: usize) -> ResearchConfig {
    ResearchConfig {
        perspectives,
        related_topics: 2,
        max_rounds: rounds,
        queries_per_question: 1,
        top_k: 3,
        run_timeout_secs: 0,
        max_concurrent_conversations: 4,
        max_concurrent_sections: 2,
    }
}

/// A research context over the given mocks with a fresh store.
pub fn context(
    llm: Arc<MockLLMClient>,
    search: Arc<MockSearchClient>,
    settings: ResearchConfig,
) -> ResearchContext {
    ResearchContext::new(llm, search, Arc::new(ReferenceStore::new()), settings)
}
