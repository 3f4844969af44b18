//! Reference Store
//!
//! The deduplicated, content-addressed corpus shared by every conversation of
//! one research run. It is the only structure mutated by concurrent tasks.
//!
//! # Guarantees
//!
//! - `insert` is idempotent: a document whose canonical URL or normalized body
//!   is already present returns the existing id, without re-embedding.
//! - References are immutable once stored and never removed.
//! - `search` ranks by cosine similarity when every reference has an embedding,
//!   otherwise by BM25; ties go to the earliest retrieved reference.
//!
//! # Concurrency
//!
//! Inserts take a fast path under a read lock when the dedup key is already
//! known, and otherwise re-check and insert under the write lock
//! (compare-and-insert keyed by the dedup hash).

pub mod canonical;
pub mod embeddings;
pub mod similarity;

use crate::search::SearchHit;
use crate::types::{AppError, Reference, ReferenceId, Result};
use crate::utils::http::truncate;
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub use embeddings::Embedder;
use similarity::{cosine_similarity, Bm25Index};

/// Longest body excerpt kept per reference, in characters
pub const MAX_EXCERPT_CHARS: usize = 2000;

/// Length of the hex id derived from the content hash
const ID_HEX_LEN: usize = 16;

/// A document offered to the store
#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub body: String,
}

impl From<SearchHit> for Candidate {
    fn from(hit: SearchHit) -> Self {
        Self {
            url: hit.url,
            title: hit.title,
            body: hit.snippet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Url(String),
    Body(String),
}

struct DedupKeys {
    id: ReferenceId,
    keys: Vec<DedupKey>,
}

impl DedupKeys {
    fn for_candidate(candidate: &Candidate) -> Option<Self> {
        let url_key = canonical::canonical_url(&candidate.url);
        let body = canonical::normalize_body(&candidate.body);
        let body_key = (!body.is_empty()).then(|| canonical::content_hash(&body));

        let id_source = match (&url_key, &body_key) {
            (Some(url), _) => canonical::content_hash(url),
            (None, Some(body_hash)) => body_hash.clone(),
            (None, None) => return None,
        };

        let mut keys = Vec::with_capacity(2);
        if let Some(url) = url_key {
            keys.push(DedupKey::Url(url));
        }
        if let Some(body_hash) = body_key {
            keys.push(DedupKey::Body(body_hash));
        }

        Some(Self {
            id: ReferenceId::new(&id_source[..ID_HEX_LEN]),
            keys,
        })
    }
}

#[derive(Default)]
struct StoreInner {
    references: Vec<Reference>,
    positions: HashMap<ReferenceId, usize>,
    keys: HashMap<DedupKey, ReferenceId>,
    lexical: Bm25Index,
}

impl StoreInner {
    fn lookup(&self, keys: &[DedupKey]) -> Option<ReferenceId> {
        keys.iter().find_map(|k| self.keys.get(k).cloned())
    }
}

/// Per-run reference corpus with semantic retrieval
pub struct ReferenceStore {
    inner: RwLock<StoreInner>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Default for ReferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceStore {
    /// Create a store that ranks lexically
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            embedder: None,
        }
    }

    /// Create a store that embeds references and ranks by cosine similarity
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            embedder: Some(embedder),
        }
    }

    /// Insert a candidate, returning its id. See [`ReferenceStore::insert_with_outcome`].
    pub fn insert(&self, candidate: Candidate) -> Result<ReferenceId> {
        self.insert_with_outcome(candidate).map(|(id, _)| id)
    }

    /// Insert a candidate; duplicates resolve to the existing id.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the candidate has neither a URL nor body text.
    pub fn insert_with_outcome(&self, candidate: Candidate) -> Result<(ReferenceId, InsertOutcome)> {
        let dedup = DedupKeys::for_candidate(&candidate).ok_or_else(|| {
            AppError::InvalidInput("Reference candidate has neither URL nor body".to_string())
        })?;

        if let Some(existing) = self.inner.read().lookup(&dedup.keys) {
            return Ok((existing, InsertOutcome::Duplicate));
        }

        // Embed outside the lock; a racing duplicate only wastes this vector.
        let body_excerpt = truncate(candidate.body.trim(), MAX_EXCERPT_CHARS).to_string();
        let text = format!("{}\n{}", candidate.title, body_excerpt);
        let embedding = self.embedder.as_ref().and_then(|embedder| {
            match embedder.embed(&[text.as_str()]) {
                Ok(mut vectors) => vectors.pop(),
                Err(e) => {
                    tracing::warn!(url = %candidate.url, error = %e, "Embedding failed; reference will rank lexically");
                    None
                }
            }
        });

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(existing) = inner.lookup(&dedup.keys) {
            return Ok((existing, InsertOutcome::Duplicate));
        }

        let position = inner.references.len();
        let reference = Reference {
            id: dedup.id.clone(),
            url: candidate.url.trim().to_string(),
            title: candidate.title.trim().to_string(),
            body_excerpt,
            retrieved_at: Utc::now(),
            embedding,
            seq: position as u64,
        };

        inner.lexical.add_document(dedup.id.as_str(), &text);
        for key in dedup.keys {
            inner.keys.insert(key, dedup.id.clone());
        }
        inner.positions.insert(dedup.id.clone(), position);
        inner.references.push(reference);

        tracing::debug!(id = %dedup.id, total = inner.references.len(), "Stored reference");
        Ok((dedup.id, InsertOutcome::Inserted))
    }

    /// Top `top_k` references for the query, best first
    pub fn search(&self, query: &str, top_k: usize) -> Vec<Reference> {
        self.search_scored(query, top_k)
            .into_iter()
            .map(|(reference, _)| reference)
            .collect()
    }

    /// Top `top_k` references with their scores, best first
    pub fn search_scored(&self, query: &str, top_k: usize) -> Vec<(Reference, f32)> {
        if top_k == 0 {
            return Vec::new();
        }

        let query_embedding = self.embed_query(query);
        let inner = self.inner.read();
        if inner.references.is_empty() {
            return Vec::new();
        }

        let dense = query_embedding
            .filter(|_| inner.references.iter().all(|r| r.embedding.is_some()));

        let mut scored: Vec<(&Reference, f32)> = match dense {
            Some(q) => inner
                .references
                .iter()
                .map(|r| {
                    let score = r
                        .embedding
                        .as_deref()
                        .map(|e| cosine_similarity(&q, e))
                        .unwrap_or(0.0);
                    (r, score)
                })
                .collect(),
            None => {
                let scores = inner.lexical.score_all(query);
                inner
                    .references
                    .iter()
                    .filter_map(|r| scores.get(r.id.as_str()).map(|s| (r, *s)))
                    .collect()
            }
        };

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.retrieved_at.cmp(&b.retrieved_at))
                .then_with(|| a.seq.cmp(&b.seq))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(r, s)| (r.clone(), s))
            .collect()
    }

    fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[query]) {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed; using lexical ranking");
                None
            }
        }
    }

    /// Every stored reference in insertion order
    pub fn all(&self) -> Vec<Reference> {
        self.inner.read().references.clone()
    }

    pub fn get(&self, id: &ReferenceId) -> Option<Reference> {
        let inner = self.inner.read();
        inner
            .positions
            .get(id)
            .map(|&pos| inner.references[pos].clone())
    }

    pub fn contains(&self, id: &ReferenceId) -> bool {
        self.inner.read().positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
