//! Source reliability policy
//!
//! Decides which search hits may become references. A hit is rejected when:
//!
//! 1. its URL is not `http`/`https` or has no host,
//! 2. its host is on the deny list (built-in plus configured),
//! 3. an allow list is configured and the host is not on it,
//! 4. its snippet is empty (nothing to cite).
//!
//! Host matching is by domain suffix on label boundaries, case-insensitive, so
//! `reddit.com` also rejects `old.reddit.com` but not `notreddit.com`.

use crate::search::SearchHit;
use crate::utils::toml_config::SearchConfig;
use url::Url;

/// User-generated or unverifiable content hosts excluded by default
pub const DEFAULT_DENY_DOMAINS: &[&str] = &[
    "quora.com",
    "pinterest.com",
    "facebook.com",
    "instagram.com",
    "tiktok.com",
    "reddit.com",
    "twitter.com",
    "x.com",
    "answers.com",
    "ehow.com",
    "scribd.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnsupportedUrl,
    Denied(String),
    NotAllowed(String),
    EmptySnippet,
}

#[derive(Debug, Clone)]
pub struct SourcePolicy {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl SourcePolicy {
    pub fn new(allow: Vec<String>, extra_deny: Vec<String>) -> Self {
        let normalize = |d: String| d.trim().trim_start_matches("www.").to_lowercase();
        let deny = DEFAULT_DENY_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .chain(extra_deny)
            .map(normalize)
            .filter(|d| !d.is_empty())
            .collect();
        let allow = allow.into_iter().map(normalize).filter(|d| !d.is_empty()).collect();

        Self { allow, deny }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.allow_domains.clone(), config.deny_domains.clone())
    }

    /// Check a single hit
    pub fn check(&self, hit: &SearchHit) -> std::result::Result<(), Rejection> {
        let url = Url::parse(hit.url.trim()).map_err(|_| Rejection::UnsupportedUrl)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::UnsupportedUrl);
        }
        let host = url
            .host_str()
            .ok_or(Rejection::UnsupportedUrl)?
            .to_lowercase();

        if let Some(d) = self.deny.iter().find(|d| host_matches(&host, d)) {
            return Err(Rejection::Denied(d.clone()));
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|d| host_matches(&host, d)) {
            return Err(Rejection::NotAllowed(host));
        }
        if hit.snippet.trim().is_empty() {
            return Err(Rejection::EmptySnippet);
        }
        Ok(())
    }

    pub fn is_reliable(&self, hit: &SearchHit) -> bool {
        self.check(hit).is_ok()
    }

    /// Keep reliable hits in order; returns the survivors and the number rejected
    pub fn filter(&self, hits: Vec<SearchHit>) -> (Vec<SearchHit>, usize) {
        let total = hits.len();
        let kept: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| match self.check(hit) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::debug!(url = %hit.url, ?reason, "Excluding unreliable source");
                    false
                }
            })
            .collect();
        let rejected = total - kept.len();
        (kept, rejected)
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}
