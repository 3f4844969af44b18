//! Polisher
//!
//! Removes statements a section repeats from the section before it and writes
//! the lead summary. Rewrites go through the same citation validation as the
//! writer, so polishing can drop citations but never invent one. Every
//! failure here is soft: the article keeps the unpolished sections.

use crate::research::citations;
use crate::research::{roles, ResearchContext};
use crate::types::{Degradation, Result, Section};
use crate::utils::http::truncate;

/// Article text shown to the lead writer
const LEAD_CONTEXT_CHARS: usize = 12_000;
const PREVIOUS_SECTION_CHARS: usize = 3_000;

#[derive(Debug, Clone, Default)]
pub struct PolishOutcome {
    pub lead_summary: String,
    pub sections: Vec<Section>,
    pub degradations: Vec<Degradation>,
}

pub struct Polisher<'a> {
    ctx: &'a ResearchContext,
}

impl<'a> Polisher<'a> {
    pub fn new(ctx: &'a ResearchContext) -> Self {
        Self { ctx }
    }

    /// # Errors
    ///
    /// Only `Authentication` escapes.
    pub async fn polish(&self, topic: &str, sections: Vec<Section>) -> Result<PolishOutcome> {
        let mut degradations = Vec::new();

        let sections = match self.deduplicate(&sections).await {
            Ok(polished) => polished,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Deduplication failed; keeping unpolished sections");
                degradations.push(polish_degradation(&e));
                sections
            }
        };

        let lead_summary = match self.lead(topic, &sections).await {
            Ok(lead) => lead,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Lead summary failed; omitting it");
                degradations.push(polish_degradation(&e));
                String::new()
            }
        };

        Ok(PolishOutcome {
            lead_summary,
            sections,
            degradations,
        })
    }

    /// Rewrite each section without what its predecessor already says.
    async fn deduplicate(&self, sections: &[Section]) -> Result<Vec<Section>> {
        let mut polished: Vec<Section> = Vec::with_capacity(sections.len());
        for (index, section) in sections.iter().enumerate() {
            let previous = index
                .checked_sub(1)
                .and_then(|i| polished.get(i))
                .map(|p| (p.title.clone(), citations::strip_markers(&p.text)));
            let (previous_title, previous_text) = match previous {
                Some(previous) if !section.text.trim().is_empty() => previous,
                _ => {
                    polished.push(section.clone());
                    continue;
                }
            };

            let (local_text, numbering) = citations::localize(&section.text);
            let prompt = format!(
                r#"Previous section "{previous_title}":
{previous_text}

Current section "{title}":
{local_text}

Rewrite the current section, removing statements that repeat the previous section.
Keep every other statement and keep the bracketed citation numbers exactly as they
appear. Return only the rewritten section text."#,
                previous_text = truncate(&previous_text, PREVIOUS_SECTION_CHARS),
                title = section.title,
            );

            let reply = self.ctx.complete("polish", &prompt, roles::POLISHER).await?;
            let resolved = citations::resolve(&reply, &numbering);
            if resolved.text.trim().is_empty() {
                polished.push(section.clone());
                continue;
            }
            if !resolved.stripped.is_empty() {
                tracing::debug!(node = section.outline_node_id, stripped = ?resolved.stripped, "Polisher introduced unknown citations");
            }

            polished.push(Section {
                text: resolved.text.trim().to_string(),
                cited_reference_ids: resolved.cited,
                ..section.clone()
            });
        }
        Ok(polished)
    }

    async fn lead(&self, topic: &str, sections: &[Section]) -> Result<String> {
        let body: String = sections
            .iter()
            .map(|s| format!("{} {}\n{}\n", "#".repeat(s.depth.max(1)), s.title, citations::strip_markers(&s.text)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"Article topic: {topic}

Article:
{body}

Write the lead paragraph for this article: a concise summary of its most important
points that stands on its own. Do not use citations or headings."#,
            body = truncate(&body, LEAD_CONTEXT_CHARS),
        );

        let reply = self.ctx.complete("lead", &prompt, roles::LEAD_WRITER).await?;
        // The lead has no sources of its own; any citation is stray.
        Ok(citations::resolve(&reply, &[]).text.trim().to_string())
    }
}

fn polish_degradation(err: &crate::types::AppError) -> Degradation {
    if err.is_cancelled() {
        Degradation::Cancelled {
            stage: "polish".to_string(),
        }
    } else {
        Degradation::PolishFailed {
            reason: err.to_string(),
        }
    }
}
