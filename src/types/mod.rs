use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============= Research Types =============

/// A persona/viewpoint that drives one research conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    pub id: usize,
    pub label: String,
    pub description: String,
    /// True for the reserved baseline fact-checker, which is never derived from surveyed content.
    #[serde(default)]
    pub baseline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Asker,
    Answerer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub perspective_id: usize,
    pub round_index: usize,
    pub role: TurnRole,
    pub text: String,
    pub cited_reference_ids: Vec<ReferenceId>,
    /// Set on answerer turns that completed through a fallback (no sources, no synthesis).
    #[serde(default)]
    pub degraded: bool,
}

/// Content-addressed identifier of a stored reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub url: String,
    pub title: String,
    pub body_excerpt: String,
    pub retrieved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Insertion sequence number, used to order references retrieved in the same instant.
    pub seq: u64,
}

/// One node of the outline tree. Node ids are indices into the owning tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub id: usize,
    pub title: String,
    pub parent_id: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub outline_node_id: usize,
    pub title: String,
    /// Heading depth below the root (top-level sections are depth 1).
    pub depth: usize,
    /// Prose with inline citation markers of the form `[@<reference id>]`.
    pub text: String,
    pub cited_reference_ids: Vec<ReferenceId>,
}

/// A stage that completed through a fallback instead of full success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    TocSkipped { topic: String },
    PerspectivesShort { requested: usize, found: usize },
    RoundDegraded { perspective: usize, round: usize, reason: String },
    PerspectiveDropped { perspective: usize, reason: String },
    OutlineFallback { reason: String },
    CitationStripped { node: usize, ids: Vec<String> },
    SectionFailed { node: usize, reason: String },
    SectionSkipped { node: usize },
    PolishFailed { reason: String },
    Cancelled { stage: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::TocSkipped { topic } => {
                write!(f, "table of contents for '{}' unavailable", topic)
            }
            Degradation::PerspectivesShort { requested, found } => write!(
                f,
                "only {} of {} requested perspectives discovered",
                found, requested
            ),
            Degradation::RoundDegraded {
                perspective,
                round,
                reason,
            } => write!(
                f,
                "perspective {} round {} degraded: {}",
                perspective,
                round + 1,
                reason
            ),
            Degradation::PerspectiveDropped {
                perspective,
                reason,
            } => write!(f, "perspective {} dropped: {}", perspective, reason),
            Degradation::OutlineFallback { reason } => {
                write!(f, "outline refinement fell back to draft: {}", reason)
            }
            Degradation::CitationStripped { node, ids } => write!(
                f,
                "section {} had unknown citations stripped: {}",
                node,
                ids.join(", ")
            ),
            Degradation::SectionFailed { node, reason } => {
                write!(f, "section {} failed: {}", node, reason)
            }
            Degradation::SectionSkipped { node } => write!(f, "section {} not written", node),
            Degradation::PolishFailed { reason } => write!(f, "polish skipped: {}", reason),
            Degradation::Cancelled { stage } => write!(f, "run cancelled during {}", stage),
        }
    }
}

/// Terminal artifact of one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub topic: String,
    pub lead_summary: String,
    pub sections: Vec<Section>,
    pub references: Vec<Reference>,
    pub degradations: Vec<Degradation>,
}

impl Article {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Whether any round or the whole conversation of a perspective fell back.
    pub fn perspective_degraded(&self, perspective_id: usize) -> bool {
        self.degradations.iter().any(|d| match d {
            Degradation::RoundDegraded { perspective, .. }
            | Degradation::PerspectiveDropped { perspective, .. } => *perspective == perspective_id,
            _ => false,
        })
    }

    /// All reference ids cited by any section, in first-citation order.
    pub fn cited_reference_ids(&self) -> Vec<ReferenceId> {
        let mut seen = std::collections::HashSet::new();
        self.sections
            .iter()
            .flat_map(|s| s.cited_reference_ids.iter())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Structural validation failed: {0}")]
    StructuralValidation(String),

    #[error("Perspective discovery failed: {0}")]
    Discovery(String),

    #[error("No usable output: {0}")]
    NoUsableOutput(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Transient failures that the caller retries with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RateLimited(_) | AppError::Timeout(_))
    }

    /// Failures that abort the whole run as soon as they surface.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Authentication(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else if err.is_decode() {
            AppError::Internal(format!("Failed to decode response: {}", err))
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_taxonomy() {
        assert!(AppError::RateLimited("429".into()).is_retryable());
        assert!(AppError::Timeout("slow".into()).is_retryable());
        assert!(!AppError::Unavailable("503".into()).is_retryable());
        assert!(!AppError::Authentication("401".into()).is_retryable());
        assert!(AppError::Authentication("401".into()).is_fatal());
        assert!(!AppError::EmptyResult("none".into()).is_fatal());
    }

    #[test]
    fn test_perspective_degraded_lookup() {
        let article = Article {
            topic: "t".into(),
            lead_summary: String::new(),
            sections: vec![],
            references: vec![],
            degradations: vec![Degradation::RoundDegraded {
                perspective: 2,
                round: 1,
                reason: "no usable search results".into(),
            }],
        };

        assert!(article.is_degraded());
        assert!(article.perspective_degraded(2));
        assert!(!article.perspective_degraded(1));
    }

    #[test]
    fn test_cited_ids_are_unique_in_order() {
        let section = |node, ids: &[&str]| Section {
            outline_node_id: node,
            title: format!("s{}", node),
            depth: 1,
            text: String::new(),
            cited_reference_ids: ids.iter().map(|i| ReferenceId::new(*i)).collect(),
        };
        let article = Article {
            topic: "t".into(),
            lead_summary: String::new(),
            sections: vec![section(1, &["b", "a"]), section(2, &["a", "c"])],
            references: vec![],
            degradations: vec![],
        };

        let ids: Vec<_> = article
            .cited_reference_ids()
            .into_iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
