//! Scoring functions for reference retrieval.
//!
//! - [`cosine_similarity`] - dense scoring when every reference has an embedding
//! - [`Bm25Index`] - lexical fallback when embeddings are unavailable

use std::collections::{HashMap, HashSet};

/// Cosine similarity in [-1, 1]; zero when either vector has no magnitude or dimensions differ.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Append-only BM25 index over reference text
#[derive(Debug, Clone)]
pub struct Bm25Index {
    /// Document key -> term frequencies
    documents: HashMap<String, HashMap<String, usize>>,
    /// Document key -> token count
    lengths: HashMap<String, usize>,
    /// Term -> number of documents containing it
    document_frequencies: HashMap<String, usize>,
    total_tokens: usize,
    /// Term frequency saturation
    k1: f32,
    /// Length normalization
    b: f32,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            lengths: HashMap::new(),
            document_frequencies: HashMap::new(),
            total_tokens: 0,
            k1: 1.2,
            b: 0.75,
        }
    }

    /// Tokenize text into lowercase terms
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    pub fn add_document(&mut self, key: &str, content: &str) {
        if self.documents.contains_key(key) {
            return;
        }

        let tokens = Self::tokenize(content);
        let mut tf: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.clone()).or_insert(0) += 1;
        }
        for term in tf.keys() {
            *self.document_frequencies.entry(term.clone()).or_insert(0) += 1;
        }

        self.total_tokens += tokens.len();
        self.lengths.insert(key.to_string(), tokens.len());
        self.documents.insert(key.to_string(), tf);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn avg_doc_length(&self) -> f32 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_tokens as f32 / self.documents.len() as f32
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f32;
        let n = self.documents.len() as f32;
        if df == 0.0 || n == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of one document for the query
    pub fn score(&self, key: &str, query: &str) -> f32 {
        let terms: HashSet<String> = Self::tokenize(query).into_iter().collect();
        self.score_terms(key, &terms)
    }

    fn score_terms(&self, key: &str, terms: &HashSet<String>) -> f32 {
        let Some(tf) = self.documents.get(key) else {
            return 0.0;
        };
        let doc_len = self.lengths.get(key).copied().unwrap_or(0) as f32;
        let avg = self.avg_doc_length().max(1.0);

        terms
            .iter()
            .map(|term| {
                let f = tf.get(term).copied().unwrap_or(0) as f32;
                if f == 0.0 {
                    return 0.0;
                }
                let numerator = f * (self.k1 + 1.0);
                let denominator = f + self.k1 * (1.0 - self.b + self.b * doc_len / avg);
                self.idf(term) * numerator / denominator
            })
            .sum()
    }

    /// Score every indexed document; documents with no term overlap are omitted
    pub fn score_all(&self, query: &str) -> HashMap<String, f32> {
        let terms: HashSet<String> = Self::tokenize(query).into_iter().collect();
        self.documents
            .keys()
            .filter_map(|key| {
                let score = self.score_terms(key, &terms);
                (score > 0.0).then(|| (key.clone(), score))
            })
            .collect()
    }
}
