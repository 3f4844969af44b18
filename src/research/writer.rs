//! Section writer
//!
//! Writes one section per outline node (pre-order, root excluded) from the
//! top-k references the store returns for the node. Generations run
//! concurrently once the outline and the store are frozen; the output keeps
//! outline order regardless of completion order.

use crate::research::citations;
use crate::research::outline::OutlineTree;
use crate::research::{roles, ResearchContext};
use crate::types::{Degradation, Reference, ReferenceId, Result, Section};
use crate::utils::http::truncate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const CANDIDATE_EXCERPT_CHARS: usize = 1000;

/// Outcome of one node
#[derive(Debug, Clone)]
pub enum SectionOutcome {
    Written {
        section: Section,
        stripped: Vec<String>,
    },
    Failed(String),
    /// Aborted or never started because the run was cancelled
    Skipped,
}

/// Sections in outline order plus the fallbacks taken.
#[derive(Debug, Clone, Default)]
pub struct WritingOutcome {
    pub sections: Vec<Section>,
    pub degradations: Vec<Degradation>,
    pub cancelled: bool,
}

pub struct SectionWriter {
    ctx: ResearchContext,
    topic: Arc<str>,
}

impl SectionWriter {
    pub fn new(ctx: ResearchContext, topic: &str) -> Self {
        Self {
            ctx,
            topic: Arc::from(topic),
        }
    }

    /// Write every section of `tree`.
    ///
    /// # Errors
    ///
    /// Only `Authentication` escapes; other failures become degradations.
    pub async fn write_all(&self, tree: &OutlineTree) -> Result<WritingOutcome> {
        let tree = Arc::new(tree.clone());
        let limit = Arc::new(Semaphore::new(self.ctx.settings.max_concurrent_sections.max(1)));
        let mut tasks = JoinSet::new();

        for node in tree.sections() {
            let node_id = node.id;
            let ctx = self.ctx.clone();
            let topic = self.topic.clone();
            let tree = tree.clone();
            let limit = limit.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => None,
                    permit = limit.acquire_owned() => permit.ok(),
                };
                let outcome = match permit {
                    Some(_permit) => write_section(&ctx, &topic, &tree, node_id).await,
                    None => Ok(SectionOutcome::Skipped),
                };
                (node_id, outcome)
            });
        }

        let mut outcomes: HashMap<usize, SectionOutcome> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((node_id, Ok(outcome))) => {
                    outcomes.insert(node_id, outcome);
                }
                Ok((_, Err(e))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => tracing::error!(error = %e, "Section task panicked"),
            }
        }

        let mut result = WritingOutcome {
            cancelled: self.ctx.cancel.is_cancelled(),
            ..Default::default()
        };
        for node in tree.sections() {
            match outcomes.remove(&node.id) {
                Some(SectionOutcome::Written { section, stripped }) => {
                    if !stripped.is_empty() {
                        result.degradations.push(Degradation::CitationStripped {
                            node: node.id,
                            ids: stripped,
                        });
                    }
                    result.sections.push(section);
                }
                Some(SectionOutcome::Failed(reason)) => {
                    result.degradations.push(Degradation::SectionFailed {
                        node: node.id,
                        reason,
                    });
                }
                Some(SectionOutcome::Skipped) => {
                    result
                        .degradations
                        .push(Degradation::SectionSkipped { node: node.id });
                }
                None => result.degradations.push(Degradation::SectionFailed {
                    node: node.id,
                    reason: "section task did not complete".to_string(),
                }),
            }
        }

        tracing::info!(
            written = result.sections.len(),
            total = tree.len() - 1,
            cancelled = result.cancelled,
            "Section writing finished"
        );
        Ok(result)
    }
}

/// Retrieval query for a node: its title plus its children's titles.
pub fn section_query(tree: &OutlineTree, node_id: usize) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(node) = tree.node(node_id) {
        parts.push(node.title.as_str());
    }
    parts.extend(tree.children_titles(node_id));
    parts.join(" ")
}

async fn write_section(
    ctx: &ResearchContext,
    topic: &str,
    tree: &OutlineTree,
    node_id: usize,
) -> Result<SectionOutcome> {
    let Some(node) = tree.node(node_id) else {
        return Ok(SectionOutcome::Failed(format!("unknown outline node {}", node_id)));
    };

    let query = section_query(tree, node_id);
    let candidates = ctx.store.search(&query, ctx.settings.top_k);
    if candidates.is_empty() {
        tracing::debug!(node = node_id, "No references retrieved; writing from the title alone");
    }

    let prompt = section_prompt(topic, tree, node_id, &candidates);
    let reply = match ctx.complete("section", &prompt, roles::SECTION_WRITER).await {
        Ok(reply) => reply,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) if e.is_cancelled() => {
            tracing::debug!(node = node_id, "Section generation cancelled");
            return Ok(SectionOutcome::Skipped);
        }
        Err(e) => {
            tracing::warn!(node = node_id, error = %e, "Section generation failed");
            return Ok(SectionOutcome::Failed(e.to_string()));
        }
    };

    let candidate_ids: Vec<ReferenceId> = candidates.into_iter().map(|r| r.id).collect();
    let resolved = citations::resolve(&strip_leading_heading(&reply), &candidate_ids);
    if !resolved.stripped.is_empty() {
        tracing::warn!(
            node = node_id,
            title = %node.title,
            stripped = ?resolved.stripped,
            "Stripped citations outside the supplied references"
        );
    }

    Ok(SectionOutcome::Written {
        section: Section {
            outline_node_id: node_id,
            title: node.title.clone(),
            depth: tree.depth(node_id),
            text: resolved.text.trim().to_string(),
            cited_reference_ids: resolved.cited,
        },
        stripped: resolved.stripped,
    })
}

fn section_prompt(topic: &str, tree: &OutlineTree, node_id: usize, candidates: &[Reference]) -> String {
    let mut path = Vec::new();
    let mut cursor = tree.node(node_id);
    while let Some(node) = cursor {
        if node.parent_id.is_some() {
            path.push(node.title.as_str());
        }
        cursor = node.parent_id.and_then(|p| tree.node(p));
    }
    path.reverse();

    let sources = if candidates.is_empty() {
        "(no sources were found; write a brief overview from the section title and do not cite anything)"
            .to_string()
    } else {
        candidates
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "[{}] {}\n{}\n{}",
                    i + 1,
                    r.title,
                    r.url,
                    truncate(&r.body_excerpt, CANDIDATE_EXCERPT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"Article topic: {topic}
Section: {section}
Subsections covered elsewhere: {subsections}

Sources:
{sources}

Write the prose for this section only, in an encyclopedic tone. Cite sources inline
with their number in square brackets, e.g. [1] or [2, 3]. Cite only the sources listed
above. Do not write a heading."#,
        section = path.join(" > "),
        subsections = {
            let titles = tree.children_titles(node_id);
            if titles.is_empty() {
                "none".to_string()
            } else {
                titles.join(", ")
            }
        },
    )
}

fn strip_leading_heading(reply: &str) -> String {
    let trimmed = reply.trim_start();
    match trimmed.split_once('\n') {
        Some((first, rest)) if first.trim_start().starts_with('#') => rest.to_string(),
        None if trimmed.starts_with('#') => String::new(),
        _ => trimmed.to_string(),
    }
}
