//! Perspective discovery
//!
//! Surveys K related topics, reads their tables of contents through the search
//! gateway, and asks the model for N distinct editor personas. The reserved
//! baseline fact-checker is always appended last and is never model-derived.

use crate::research::{parse_list, roles, ResearchContext};
use crate::search::SearchHit;
use crate::types::{AppError, Degradation, Perspective, Result};
use crate::utils::http::truncate;
use futures::future::join_all;
use std::collections::HashSet;

pub const BASELINE_LABEL: &str = "Baseline fact-checker";
pub const BASELINE_DESCRIPTION: &str =
    "Broadly covers the basic facts about the topic and checks them against reliable sources.";

/// Hits kept per related-topic table of contents
const TOC_HITS: usize = 3;
const TOC_SNIPPET_CHARS: usize = 400;

/// Discovered perspectives and the fallbacks taken while finding them.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// N (or fewer) discovered perspectives followed by the baseline
    pub perspectives: Vec<Perspective>,
    pub degradations: Vec<Degradation>,
}

pub struct PerspectiveDiscovery<'a> {
    ctx: &'a ResearchContext,
}

impl<'a> PerspectiveDiscovery<'a> {
    pub fn new(ctx: &'a ResearchContext) -> Self {
        Self { ctx }
    }

    /// Discover perspectives for `topic`.
    ///
    /// # Errors
    ///
    /// `Discovery` when related-topic or persona generation exhausts retries or
    /// yields no persona; `Authentication` and `Cancelled` pass through.
    pub async fn discover(&self, topic: &str) -> Result<DiscoveryOutcome> {
        let related = self.related_topics(topic).await?;
        tracing::info!(topic, related = related.len(), "Surveying related topics");

        let mut degradations = Vec::new();
        let mut tocs = Vec::new();
        let fetched = join_all(related.iter().map(|t| self.table_of_contents(t))).await;
        for (related_topic, result) in related.iter().zip(fetched) {
            match result {
                Ok(Some(toc)) => tocs.push(toc),
                Ok(None) => {
                    tracing::warn!(topic = %related_topic, "No table of contents found; skipping");
                    degradations.push(Degradation::TocSkipped {
                        topic: related_topic.clone(),
                    });
                }
                Err(e) if e.is_fatal() || e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(topic = %related_topic, error = %e, "Table of contents fetch failed; skipping");
                    degradations.push(Degradation::TocSkipped {
                        topic: related_topic.clone(),
                    });
                }
            }
        }

        let mut perspectives = self.personas(topic, &tocs).await?;
        let requested = self.ctx.settings.perspectives;
        if perspectives.len() < requested {
            tracing::warn!(have = perspectives.len(), want = requested, "Continuing with fewer perspectives");
            degradations.push(Degradation::PerspectivesShort {
                requested,
                found: perspectives.len(),
            });
        }
        let baseline_id = perspectives.len();
        perspectives.push(Perspective {
            id: baseline_id,
            label: BASELINE_LABEL.to_string(),
            description: BASELINE_DESCRIPTION.to_string(),
            baseline: true,
        });

        Ok(DiscoveryOutcome {
            perspectives,
            degradations,
        })
    }

    async fn related_topics(&self, topic: &str) -> Result<Vec<String>> {
        let k = self.ctx.settings.related_topics;
        if k == 0 {
            return Ok(Vec::new());
        }

        let prompt = format!(
            r#"I am writing an encyclopedia article about: {topic}

List {k} closely related topics whose encyclopedia articles would help me decide what the article should cover.

Return only the topic names, one per line."#
        );

        let response = self
            .ctx
            .complete("related_topics", &prompt, roles::TOPIC_SCOUT)
            .await
            .map_err(discovery_error)?;

        let mut seen = HashSet::new();
        Ok(parse_list(&response)
            .into_iter()
            .filter(|t| seen.insert(t.to_lowercase()))
            .take(k)
            .collect())
    }

    /// `Ok(None)` when search returns nothing usable for the topic.
    async fn table_of_contents(&self, related_topic: &str) -> Result<Option<String>> {
        let query = format!("{} wikipedia", related_topic);
        let hits = self
            .ctx
            .web_search("toc_search", &query)
            .await?;
        let hits: Vec<SearchHit> = hits
            .into_iter()
            .filter(|h| !h.title.trim().is_empty() || !h.snippet.trim().is_empty())
            .take(TOC_HITS)
            .collect();
        if hits.is_empty() {
            return Ok(None);
        }

        let mut toc = format!("## {}\n", related_topic);
        for hit in hits {
            toc.push_str(&format!(
                "- {}: {}\n",
                hit.title.trim(),
                truncate(hit.snippet.trim(), TOC_SNIPPET_CHARS)
            ));
        }
        Ok(Some(toc))
    }

    async fn personas(&self, topic: &str, tocs: &[String]) -> Result<Vec<Perspective>> {
        let n = self.ctx.settings.perspectives;
        let mut accepted: Vec<(String, String)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([BASELINE_LABEL.to_lowercase()]);

        for attempt in 0..2 {
            let missing = n - accepted.len();
            let prompt = persona_prompt(topic, tocs, missing, &accepted);
            let response = self
                .ctx
                .complete("perspectives", &prompt, roles::PERSONA_EDITOR)
                .await
                .map_err(discovery_error)?;

            for (label, description) in parse_personas(&response) {
                if accepted.len() >= n {
                    break;
                }
                if seen.insert(label.to_lowercase()) {
                    accepted.push((label, description));
                }
            }

            if accepted.len() >= n {
                break;
            }
            tracing::debug!(attempt, have = accepted.len(), want = n, "Too few distinct perspectives");
        }

        if accepted.is_empty() {
            return Err(AppError::Discovery(format!(
                "No perspectives could be extracted for '{}'",
                topic
            )));
        }
        Ok(accepted
            .into_iter()
            .enumerate()
            .map(|(id, (label, description))| Perspective {
                id,
                label,
                description,
                baseline: false,
            })
            .collect())
    }
}

fn persona_prompt(topic: &str, tocs: &[String], count: usize, existing: &[(String, String)]) -> String {
    let examples = if tocs.is_empty() {
        "(no related articles were available)".to_string()
    } else {
        tocs.join("\n")
    };

    let mut prompt = format!(
        r#"Topic: {topic}

Outlines of related articles, for inspiration:
{examples}

Select {count} editors who would each research this topic from a different angle.
Each editor represents a distinct perspective, role or affiliation relevant to the topic.

Return one editor per line in the form:
<short label>: <one-sentence description of what they focus on>"#
    );

    if !existing.is_empty() {
        let taken: Vec<&str> = existing.iter().map(|(label, _)| label.as_str()).collect();
        prompt.push_str(&format!(
            "\n\nThese editors are already selected, do not repeat them: {}",
            taken.join(", ")
        ));
    }
    prompt
}

/// Parse `label: description` lines. A line without a colon is its own label and description.
pub fn parse_personas(response: &str) -> Vec<(String, String)> {
    parse_list(response)
        .into_iter()
        .filter_map(|line| {
            let (label, description) = match line.split_once(':') {
                Some((label, description)) => (label, description),
                None => (line.as_str(), line.as_str()),
            };
            let label = label.trim().trim_matches('*').trim().to_string();
            let description = description.trim().trim_matches('*').trim().to_string();
            if label.is_empty() {
                return None;
            }
            let description = if description.is_empty() {
                label.clone()
            } else {
                description
            };
            Some((label, description))
        })
        .collect()
}

fn discovery_error(err: AppError) -> AppError {
    if err.is_fatal() || err.is_cancelled() {
        err
    } else {
        AppError::Discovery(err.to_string())
    }
}
