//! Markdown rendering of a finished article

use crate::research::citations;
use crate::types::Article;

impl Article {
    /// Render as Markdown: lead, sections as headings by depth, `[n]` citations
    /// numbered in first-citation order, the cited references, and a note
    /// listing degradations if there were any.
    pub fn to_markdown(&self) -> String {
        let numbering = self.cited_reference_ids();
        let mut out = format!("# {}\n\n", self.topic);

        if !self.lead_summary.trim().is_empty() {
            out.push_str(self.lead_summary.trim());
            out.push_str("\n\n");
        }

        for section in &self.sections {
            out.push_str(&format!(
                "{} {}\n\n",
                "#".repeat(section.depth.clamp(1, 5) + 1),
                section.title
            ));
            let text = citations::number_with(&section.text, &numbering);
            if !text.trim().is_empty() {
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
        }

        if !numbering.is_empty() {
            out.push_str("## References\n\n");
            for (i, id) in numbering.iter().enumerate() {
                match self.references.iter().find(|r| r.id == *id) {
                    Some(r) if !r.url.is_empty() => {
                        out.push_str(&format!("{}. [{}]({})\n", i + 1, display_title(&r.title, &r.url), r.url))
                    }
                    Some(r) => out.push_str(&format!("{}. {}\n", i + 1, display_title(&r.title, id.as_str()))),
                    None => out.push_str(&format!("{}. {}\n", i + 1, id)),
                }
            }
            out.push('\n');
        }

        if self.is_degraded() {
            out.push_str("---\n\n> **Note:** parts of this article were produced through fallbacks:\n");
            for degradation in &self.degradations {
                out.push_str(&format!("> - {}\n", degradation));
            }
        }

        out.trim_end().to_string() + "\n"
    }
}

fn display_title<'a>(title: &'a str, fallback: &'a str) -> &'a str {
    if title.trim().is_empty() {
        fallback
    } else {
        title.trim()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{Article, Degradation, Reference, ReferenceId, Section};
    use chrono::Utc;

    fn reference(id: &str, url: &str, title: &str) -> Reference {
        Reference {
            id: ReferenceId::new(id),
            url: url.to_string(),
            title: title.to_string(),
            body_excerpt: String::new(),
            retrieved_at: Utc::now(),
            embedding: None,
            seq: 0,
        }
    }

    fn section(node: usize, depth: usize, title: &str, text: &str, cited: &[&str]) -> Section {
        Section {
            outline_node_id: node,
            title: title.to_string(),
            depth,
            text: text.to_string(),
            cited_reference_ids: cited.iter().map(|c| ReferenceId::new(*c)).collect(),
        }
    }

    #[test]
    fn test_markdown_numbers_citations_in_order() {
        let article = Article {
            topic: "Curling".to_string(),
            lead_summary: "A sport on ice.".to_string(),
            sections: vec![
                section(1, 1, "Rules", "Stones slide [@bb].", &["bb"]),
                section(2, 2, "Scoring", "Ends are scored [@aa][@bb].", &["aa", "bb"]),
            ],
            references: vec![
                reference("aa", "https://a.org", "A"),
                reference("bb", "https://b.org", ""),
                reference("cc", "https://c.org", "Uncited"),
            ],
            degradations: vec![],
        };

        let md = article.to_markdown();
        assert!(md.starts_with("# Curling\n\nA sport on ice.\n\n## Rules\n\nStones slide [1].\n\n### Scoring"));
        assert!(md.contains("Ends are scored [2][1]."));
        assert!(md.contains("1. [https://b.org](https://b.org)\n2. [A](https://a.org)\n"));
        assert!(!md.contains("Uncited"));
        assert!(!md.contains("Note"));
    }

    #[test]
    fn test_markdown_lists_degradations() {
        let article = Article {
            topic: "Curling".to_string(),
            lead_summary: String::new(),
            sections: vec![],
            references: vec![],
            degradations: vec![Degradation::PolishFailed {
                reason: "timeout".to_string(),
            }],
        };

        let md = article.to_markdown();
        assert!(md.contains("> - polish skipped: timeout"));
    }
}
