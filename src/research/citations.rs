//! Inline citation handling
//!
//! Models see sources as a numbered list and cite them as `[1]`, `[2, 3]`.
//! Stored text carries store-level markers `[@<reference id>]` instead, so a
//! citation stays valid no matter which numbered list it came from.
//!
//! Resolution only ever emits ids from the supplied candidate list. Anything
//! else (out-of-range numbers, ids the model invented) is stripped and reported.

use crate::types::ReferenceId;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

/// `[3]`, `[1, 4]` or `[@abc123]`
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(@[A-Za-z0-9_-]+|\d+(?:\s*,\s*\d+)*)\]").expect("citation pattern")
});

static STORE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[@([A-Za-z0-9_-]+)\]").expect("store marker pattern"));

static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,;:!?])").expect("punctuation pattern"));

static DOUBLE_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space pattern"));

/// Text with citations mapped onto store ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCitations {
    /// Text using `[@id]` markers only
    pub text: String,
    /// Cited ids in first-citation order, without repeats
    pub cited: Vec<ReferenceId>,
    /// Citation tokens that did not match a candidate, as written by the model
    pub stripped: Vec<String>,
}

/// Map `[n]` (1-based into `candidates`) and `[@id]` citations onto store markers.
pub fn resolve(text: &str, candidates: &[ReferenceId]) -> ResolvedCitations {
    let allowed: HashSet<&str> = candidates.iter().map(|id| id.as_str()).collect();
    let mut cited: Vec<ReferenceId> = Vec::new();
    let mut stripped: Vec<String> = Vec::new();

    let replaced = CITATION_RE.replace_all(text, |caps: &Captures| {
        let token = &caps[1];
        let mut markers = String::new();

        if let Some(raw_id) = token.strip_prefix('@') {
            if allowed.contains(raw_id) {
                push_unique(&mut cited, ReferenceId::new(raw_id));
                markers.push_str(&format!("[@{}]", raw_id));
            } else {
                stripped.push(format!("@{}", raw_id));
            }
            return markers;
        }

        for number in token.split(',').map(str::trim) {
            let resolved = number
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| candidates.get(idx));
            match resolved {
                Some(id) => {
                    push_unique(&mut cited, id.clone());
                    markers.push_str(&format!("[@{}]", id));
                }
                None => stripped.push(number.to_string()),
            }
        }
        markers
    });

    let text = if stripped.is_empty() {
        replaced.into_owned()
    } else {
        tidy(&replaced)
    };

    ResolvedCitations {
        text,
        cited,
        stripped,
    }
}

/// Store ids cited in text, first-citation order, without repeats.
pub fn cited_ids(text: &str) -> Vec<ReferenceId> {
    let mut ids = Vec::new();
    for caps in STORE_MARKER_RE.captures_iter(text) {
        push_unique(&mut ids, ReferenceId::new(&caps[1]));
    }
    ids
}

/// Rewrite `[@id]` markers as `[n]` against a fresh numbering.
///
/// Returns the rewritten text and the ids in numbering order, so the reply can
/// be mapped back with [`resolve`].
pub fn localize(text: &str) -> (String, Vec<ReferenceId>) {
    let mut order: Vec<ReferenceId> = Vec::new();
    let rewritten = STORE_MARKER_RE.replace_all(text, |caps: &Captures| {
        let id = ReferenceId::new(&caps[1]);
        let position = match order.iter().position(|existing| *existing == id) {
            Some(pos) => pos,
            None => {
                order.push(id);
                order.len() - 1
            }
        };
        format!("[{}]", position + 1)
    });
    (rewritten.into_owned(), order)
}

/// Rewrite `[@id]` markers using a caller-supplied numbering; unknown ids are dropped.
pub fn number_with(text: &str, numbering: &[ReferenceId]) -> String {
    STORE_MARKER_RE
        .replace_all(text, |caps: &Captures| {
            numbering
                .iter()
                .position(|id| id.as_str() == &caps[1])
                .map(|pos| format!("[{}]", pos + 1))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Remove all `[@id]` markers.
pub fn strip_markers(text: &str) -> String {
    tidy(&STORE_MARKER_RE.replace_all(text, ""))
}

fn push_unique(ids: &mut Vec<ReferenceId>, id: ReferenceId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

fn tidy(text: &str) -> String {
    let text = SPACE_BEFORE_PUNCT_RE.replace_all(text, "$1");
    DOUBLE_SPACE_RE.replace_all(&text, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<ReferenceId> {
        raw.iter().map(|s| ReferenceId::new(*s)).collect()
    }

    #[test]
    fn test_resolve_numbered_citations() {
        let candidates = ids(&["aaa", "bbb", "ccc"]);
        let resolved = resolve("Beijing hosted [1]. Norway led the table [3, 1].", &candidates);

        assert_eq!(resolved.text, "Beijing hosted [@aaa]. Norway led the table [@ccc][@aaa].");
        assert_eq!(resolved.cited, ids(&["aaa", "ccc"]));
        assert!(resolved.stripped.is_empty());
    }

    #[test]
    fn test_resolve_strips_out_of_range_numbers() {
        let candidates = ids(&["aaa"]);
        let resolved = resolve("Claim one [1]. Claim two [7].", &candidates);

        assert_eq!(resolved.text, "Claim one [@aaa]. Claim two.");
        assert_eq!(resolved.cited, ids(&["aaa"]));
        assert_eq!(resolved.stripped, vec!["7".to_string()]);
    }

    #[test]
    fn test_resolve_strips_unknown_store_ids() {
        let candidates = ids(&["aaa"]);
        let resolved = resolve("Known [@aaa] and invented [@deadbeef] claims.", &candidates);

        assert_eq!(resolved.text, "Known [@aaa] and invented claims.");
        assert_eq!(resolved.stripped, vec!["@deadbeef".to_string()]);
    }

    #[test]
    fn test_resolve_keeps_partial_group() {
        let candidates = ids(&["aaa", "bbb"]);
        let resolved = resolve("Mixed group [2, 9].", &candidates);

        assert_eq!(resolved.text, "Mixed group [@bbb].");
        assert_eq!(resolved.stripped, vec!["9".to_string()]);
    }

    #[test]
    fn test_localize_then_resolve_round_trips_markers() {
        let text = "First [@x1] then [@y2] and [@x1] again.";
        let (local, order) = localize(text);

        assert_eq!(local, "First [1] then [2] and [1] again.");
        assert_eq!(order, ids(&["x1", "y2"]));
        assert_eq!(resolve(&local, &order).text, text);
    }

    #[test]
    fn test_cited_ids_and_number_with() {
        let text = "A [@b] B [@a] C [@b] D [@zz]";
        assert_eq!(cited_ids(text), ids(&["b", "a", "zz"]));
        assert_eq!(number_with(text, &ids(&["a", "b"])), "A [2] B [1] C [2] D ");
    }
}
