//! Outline synthesis
//!
//! Two phases: a draft from the topic alone, then a refinement against every
//! conversation transcript. Model output is parsed into a staging list of
//! [`OutlineEntry`] values and only becomes an [`OutlineTree`] after
//! [`OutlineTree::from_entries`] has validated it, so an invalid refinement
//! can never replace a valid outline.

use crate::research::conversation::Transcript;
use crate::research::{roles, ResearchContext};
use crate::types::{AppError, Degradation, OutlineNode, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Answer text per round shown to the refiner
const REFINE_ANSWER_CHARS: usize = 500;
/// Upper bound on the transcript material sent to the refiner
const REFINE_CONTEXT_CHARS: usize = 40_000;
/// Headings that belong to the reference apparatus, not the prose
const SKIPPED_HEADINGS: &[&str] = &["references", "see also", "external links", "further reading", "notes"];

/// Staging form of a node, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub id: usize,
    pub title: String,
    #[serde(default, alias = "parent")]
    pub parent_id: Option<usize>,
}

/// A validated outline. Node ids are pre-order positions; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineTree {
    nodes: Vec<OutlineNode>,
}

impl OutlineTree {
    /// Validate staged entries and build the tree.
    ///
    /// Sibling order follows entry order.
    ///
    /// # Errors
    ///
    /// `StructuralValidation` when the entries do not form a tree with a
    /// single root that has at least one child.
    pub fn from_entries(entries: &[OutlineEntry]) -> Result<Self> {
        let invalid = |msg: String| Err(AppError::StructuralValidation(msg));

        if entries.is_empty() {
            return invalid("outline is empty".to_string());
        }

        let mut by_id: HashMap<usize, &OutlineEntry> = HashMap::new();
        for entry in entries {
            if entry.title.trim().is_empty() {
                return invalid(format!("node {} has an empty title", entry.id));
            }
            if by_id.insert(entry.id, entry).is_some() {
                return invalid(format!("duplicate node id {}", entry.id));
            }
        }

        let roots: Vec<&OutlineEntry> = entries.iter().filter(|e| e.parent_id.is_none()).collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => return invalid("outline has no root".to_string()),
            _ => return invalid(format!("outline has {} roots", roots.len())),
        };

        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        for entry in entries {
            if let Some(parent) = entry.parent_id {
                if !by_id.contains_key(&parent) {
                    return invalid(format!("node {} has unknown parent {}", entry.id, parent));
                }
                if parent == entry.id {
                    return invalid(format!("node {} is its own parent", entry.id));
                }
                children.entry(parent).or_default().push(entry.id);
            }
        }

        for entry in entries {
            let mut seen = HashSet::from([entry.id]);
            let mut cursor = entry.parent_id;
            while let Some(parent) = cursor {
                if !seen.insert(parent) {
                    return invalid(format!("node {} is its own ancestor", entry.id));
                }
                cursor = by_id.get(&parent).and_then(|p| p.parent_id);
            }
        }

        if children.get(&root.id).map_or(true, |c| c.is_empty()) {
            return invalid("outline root has no sections".to_string());
        }

        // Re-number in pre-order so ids are positions in `nodes`.
        let mut nodes: Vec<OutlineNode> = Vec::with_capacity(entries.len());
        let mut stack: Vec<(usize, Option<usize>)> = vec![(root.id, None)];
        while let Some((staged_id, parent)) = stack.pop() {
            let id = nodes.len();
            nodes.push(OutlineNode {
                id,
                title: by_id[&staged_id].title.trim().to_string(),
                parent_id: parent,
                children: Vec::new(),
            });
            if let Some(parent) = parent {
                nodes[parent].children.push(id);
            }
            if let Some(kids) = children.get(&staged_id) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, Some(id)));
                }
            }
        }

        if nodes.len() != entries.len() {
            return invalid(format!(
                "{} nodes are not connected to the root",
                entries.len() - nodes.len()
            ));
        }

        Ok(Self { nodes })
    }

    /// Parse a model reply (Markdown headings or a JSON node list) and validate it.
    pub fn parse(topic: &str, reply: &str) -> Result<Self> {
        let body = strip_code_fence(reply);
        let entries = if body.trim_start().starts_with('[') {
            serde_json::from_str::<Vec<OutlineEntry>>(body).map_err(|e| {
                AppError::StructuralValidation(format!("outline JSON is malformed: {}", e))
            })?
        } else {
            parse_markdown(topic, body)
        };
        Self::from_entries(&entries)
    }

    pub fn root(&self) -> &OutlineNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: usize) -> Option<&OutlineNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[OutlineNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order traversal excluding the root
    pub fn sections(&self) -> impl Iterator<Item = &OutlineNode> {
        self.nodes.iter().skip(1)
    }

    /// Depth below the root (top-level sections are 1)
    pub fn depth(&self, id: usize) -> usize {
        let mut depth = 0;
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent_id);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.nodes[parent].parent_id;
        }
        depth
    }

    pub fn children_titles(&self, id: usize) -> Vec<&str> {
        self.nodes
            .get(id)
            .map(|n| n.children.iter().map(|c| self.nodes[*c].title.as_str()).collect())
            .unwrap_or_default()
    }

    /// Markdown headings, one `#` per depth level; the root is omitted.
    pub fn to_markdown(&self) -> String {
        self.sections()
            .map(|node| format!("{} {}", "#".repeat(self.depth(node.id)), node.title))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build staging entries from Markdown headings. The root is titled `topic`.
pub fn parse_markdown(topic: &str, text: &str) -> Vec<OutlineEntry> {
    let headings: Vec<(usize, String)> = text
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let level = line.chars().take_while(|c| *c == '#').count();
            if level == 0 {
                return None;
            }
            let title = line[level..].trim().trim_matches('*').trim();
            (!title.is_empty()).then(|| (level, title.to_string()))
        })
        .collect();

    let mut entries = vec![OutlineEntry {
        id: 0,
        title: topic.to_string(),
        parent_id: None,
    }];

    let mut headings = headings.into_iter().peekable();
    let mut root_level = 0;
    if let Some((level, title)) = headings.peek() {
        if title.eq_ignore_ascii_case(topic.trim()) {
            root_level = *level;
            headings.next();
        }
    }

    // (level, entry id) of the open heading chain
    let mut chain: Vec<(usize, usize)> = vec![(root_level, 0)];
    let mut skip_below: Option<usize> = None;
    for (level, title) in headings {
        let level = level.max(root_level + 1);
        if let Some(skipped) = skip_below {
            if level > skipped {
                continue;
            }
            skip_below = None;
        }
        if SKIPPED_HEADINGS.contains(&title.to_lowercase().as_str()) {
            skip_below = Some(level);
            continue;
        }

        while chain.last().map_or(false, |(open, _)| *open >= level) {
            chain.pop();
        }
        let parent = chain.last().map(|(_, id)| *id).unwrap_or(0);
        let id = entries.len();
        entries.push(OutlineEntry {
            id,
            title,
            parent_id: Some(parent),
        });
        chain.push((level, id));
    }
    entries
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let after_open = trimmed.find('\n').map(|i| &trimmed[i + 1..]).unwrap_or("");
    after_open.trim_end().trim_end_matches("```").trim()
}

/// The final outline and the fallbacks taken to get it.
#[derive(Debug, Clone)]
pub struct OutlineOutcome {
    pub tree: OutlineTree,
    pub degradations: Vec<Degradation>,
}

pub struct OutlineSynthesizer<'a> {
    ctx: &'a ResearchContext,
}

impl<'a> OutlineSynthesizer<'a> {
    pub fn new(ctx: &'a ResearchContext) -> Self {
        Self { ctx }
    }

    /// Draft from the topic, then refine against the transcripts.
    ///
    /// # Errors
    ///
    /// `NoUsableOutput` if neither phase produced a valid tree;
    /// `Authentication` and `Cancelled` pass through.
    pub async fn synthesize(&self, topic: &str, transcripts: &[Transcript]) -> Result<OutlineOutcome> {
        let draft = match self.draft(topic).await {
            Ok(tree) => Some(tree),
            Err(e) if e.is_fatal() || e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Draft outline failed");
                None
            }
        };

        match self.refine(topic, draft.as_ref(), transcripts).await {
            Ok(tree) => {
                tracing::info!(sections = tree.len() - 1, "Outline refined");
                Ok(OutlineOutcome {
                    tree,
                    degradations: Vec::new(),
                })
            }
            Err(e) if e.is_fatal() || e.is_cancelled() => Err(e),
            Err(e) => match draft {
                Some(tree) => {
                    tracing::warn!(error = %e, "Outline refinement failed; keeping the draft");
                    Ok(OutlineOutcome {
                        tree,
                        degradations: vec![Degradation::OutlineFallback {
                            reason: e.to_string(),
                        }],
                    })
                }
                None => Err(AppError::NoUsableOutput(format!(
                    "no valid outline for '{}': {}",
                    topic, e
                ))),
            },
        }
    }

    /// Outline from the topic alone.
    pub async fn draft(&self, topic: &str) -> Result<OutlineTree> {
        let prompt = format!(
            r###"Write an outline for an encyclopedia article about: {topic}

Use "#" for section titles, "##" for subsection titles, and so on.
Do not include the article title or any other text."###
        );
        self.generate_validated("outline_draft", topic, &prompt).await
    }

    /// Refine `draft` using what the conversations found.
    pub async fn refine(
        &self,
        topic: &str,
        draft: Option<&OutlineTree>,
        transcripts: &[Transcript],
    ) -> Result<OutlineTree> {
        let draft_text = draft
            .map(|d| d.to_markdown())
            .unwrap_or_else(|| "(no draft available)".to_string());
        let prompt = format!(
            r###"You are improving the outline of an encyclopedia article about: {topic}

Draft outline:
{draft_text}

Research conversations:
{conversations}

Rewrite the outline so it reflects what the research found. You may add, remove,
reorder or rename sections. Use "#" for section titles, "##" for subsection titles,
and so on. Do not include the article title or any other text."###,
            conversations = render_transcripts(transcripts),
        );
        self.generate_validated("outline_refine", topic, &prompt).await
    }

    /// Generate and validate, re-asking once on a structural failure.
    async fn generate_validated(&self, label: &str, topic: &str, prompt: &str) -> Result<OutlineTree> {
        let mut last_error = None;
        for attempt in 0..2 {
            let reply = self.ctx.complete(label, prompt, roles::OUTLINER).await?;
            match OutlineTree::parse(topic, &reply) {
                Ok(tree) => return Ok(tree),
                Err(e) => {
                    tracing::warn!(call = label, attempt, error = %e, "Rejected invalid outline");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::StructuralValidation("outline rejected".to_string())))
    }
}

fn render_transcripts(transcripts: &[Transcript]) -> String {
    let mut out = String::new();
    for transcript in transcripts.iter().filter(|t| t.rounds() > 0) {
        let block = format!(
            "### {}\n{}",
            transcript.perspective.label,
            transcript.render(REFINE_ANSWER_CHARS)
        );
        if out.len() + block.len() > REFINE_CONTEXT_CHARS {
            tracing::debug!("Truncating transcript context for outline refinement");
            break;
        }
        out.push_str(&block);
    }
    if out.is_empty() {
        out.push_str("(no conversations completed)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry(id: usize, title: &str, parent: Option<usize>) -> OutlineEntry {
        OutlineEntry {
            id,
            title: title.to_string(),
            parent_id: parent,
        }
    }

    #[test]
    fn test_parse_markdown_builds_hierarchy() {
        let tree = OutlineTree::parse(
            "Winter Olympics",
            "# Winter Olympics\n## Bidding\n## Venues\n### Artificial snow\n## Medal table\n## References\n### Books",
        )
        .unwrap();

        let titles: Vec<&str> = tree.sections().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Bidding", "Venues", "Artificial snow", "Medal table"]);
        assert_eq!(tree.depth(1), 1);
        assert_eq!(tree.depth(3), 2);
        assert_eq!(tree.children_titles(2), vec!["Artificial snow"]);
        assert_eq!(tree.root().children, vec![1, 2, 4]);
    }

    #[test]
    fn test_parse_markdown_without_title_heading() {
        let tree = OutlineTree::parse("Curling", "# Rules\n# History\n## Origins").unwrap();
        assert_eq!(tree.root().title, "Curling");
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.to_markdown(), "# Rules\n# History\n## Origins");
    }

    #[test]
    fn test_parse_json_entries() {
        let reply = "```json\n[{\"id\":10,\"title\":\"Topic\",\"parent\":null},{\"id\":11,\"title\":\"A\",\"parent\":10}]\n```";
        let tree = OutlineTree::parse("Topic", reply).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.node(1).unwrap().parent_id, Some(0));
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::two_roots(vec![entry(0, "R", None), entry(1, "S", None)])]
    #[case::duplicate_id(vec![entry(0, "R", None), entry(1, "A", Some(0)), entry(1, "B", Some(0))])]
    #[case::unknown_parent(vec![entry(0, "R", None), entry(1, "A", Some(9))])]
    #[case::cycle(vec![entry(0, "R", None), entry(1, "A", Some(0)), entry(2, "B", Some(3)), entry(3, "C", Some(2))])]
    #[case::self_parent(vec![entry(0, "R", None), entry(1, "A", Some(0)), entry(2, "B", Some(2))])]
    #[case::bare_root(vec![entry(0, "R", None)])]
    #[case::blank_title(vec![entry(0, "R", None), entry(1, " ", Some(0))])]
    fn test_rejects_non_trees(#[case] entries: Vec<OutlineEntry>) {
        let result = OutlineTree::from_entries(&entries);
        assert!(matches!(result, Err(AppError::StructuralValidation(_))));
    }

    #[test]
    fn test_from_entries_renumbers_in_preorder() {
        let tree = OutlineTree::from_entries(&[
            entry(7, "Root", None),
            entry(3, "B", Some(7)),
            entry(5, "A child", Some(9)),
            entry(9, "A", Some(7)),
        ])
        .unwrap();

        let titles: Vec<&str> = tree.nodes().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Root", "B", "A", "A child"]);
        for node in tree.sections() {
            let parent = tree.node(node.parent_id.unwrap()).unwrap();
            assert!(parent.children.contains(&node.id));
        }
    }
}
