//! Dedup keys for references.
//!
//! Two documents are the same reference when their canonical URLs match or
//! their normalized bodies match. Canonicalisation ignores scheme, a leading
//! `www.`, fragments, trailing slashes, tracking parameters and query order.

use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters that never change the document being addressed
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "ref_src"];

pub fn canonical_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return Some(raw.to_lowercase()),
    };

    let host = url.host_str().unwrap_or_default().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut canonical = host.to_string();
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{}", port));
    }
    canonical.push_str(url.path().trim_end_matches('/'));

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if !params.is_empty() {
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        canonical.push('?');
        canonical.push_str(&query.join("&"));
    }

    Some(canonical)
}

/// Lowercase and collapse whitespace
pub fn normalize_body(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://www.Example.com/a/", "http://example.com/a")]
    #[case("https://example.com/a#section", "https://example.com/a")]
    #[case("https://example.com/a?b=2&a=1", "https://example.com/a?a=1&b=2")]
    #[case("https://example.com/a?utm_source=x&id=3", "https://example.com/a?id=3")]
    #[case("https://example.com/a?fbclid=abc", "https://example.com/a")]
    fn test_equivalent_urls(#[case] a: &str, #[case] b: &str) {
        assert_eq!(canonical_url(a), canonical_url(b));
    }

    #[test]
    fn test_distinct_urls_stay_distinct() {
        assert_ne!(
            canonical_url("https://example.com/a"),
            canonical_url("https://example.com/b")
        );
        assert_ne!(
            canonical_url("https://example.com:8080/a"),
            canonical_url("https://example.com/a")
        );
    }

    #[test]
    fn test_empty_url_has_no_key() {
        assert_eq!(canonical_url("   "), None);
    }

    #[test]
    fn test_normalize_body() {
        assert_eq!(normalize_body("  Hello\n\tWORLD  again "), "hello world again");
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let h = content_hash("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("abc"));
        assert_ne!(h, content_hash("abd"));
    }
}
