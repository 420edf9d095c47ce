//! URL normalization and content fingerprints.

use apicatalog_shared::CatalogRecord;
use sha2::{Digest, Sha256};

/// Query parameters that only track referrals and never change what a URL points at.
pub const TRACKING_PARAMS: &[&str] = &["utm_source", "utm_medium", "utm_campaign", "ref", "referer"];

/// Normalize a URL for duplicate detection.
///
/// Lowercases, trims, strips trailing slashes and removes tracking parameters
/// from the query string. If no parameter survives, the query is dropped and
/// only the base URL remains.
pub fn normalize_url(url: &str) -> String {
    // Dropping a trailing tracking param can expose another trailing slash.
    let mut current = normalize_once(url);
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(url: &str) -> String {
    let lowered = url.trim().to_lowercase();
    let trimmed = lowered.trim_end_matches('/');

    let Some((base, query)) = trimmed.split_once('?') else {
        return trimmed.to_string();
    };

    let base = base.trim_end_matches('/');
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(k, _)| k);
            !TRACKING_PARAMS.contains(&key)
        })
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

/// Content fingerprint: SHA-256 over `normalized url|name|category`.
///
/// Name and category are lowercased and whitespace-collapsed, so cosmetic
/// variations of the same entry fingerprint identically.
pub fn fingerprint(record: &CatalogRecord) -> String {
    let material = format!(
        "{}|{}|{}",
        normalize_url(&record.url),
        collapse_whitespace(&record.name.to_lowercase()),
        collapse_whitespace(&record.category.to_lowercase()),
    );
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_trims_and_strips_slash() {
        assert_eq!(
            normalize_url("  HTTPS://Api.Example.com/V1/ "),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn drops_tracking_params_keeps_others() {
        assert_eq!(
            normalize_url("https://x.io/api?utm_source=tw&page=2&ref=hn"),
            "https://x.io/api?page=2"
        );
    }

    #[test]
    fn collapses_to_base_when_only_tracking_params() {
        assert_eq!(
            normalize_url("https://x.io/api/?utm_campaign=launch&referer=blog"),
            "https://x.io/api"
        );
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "https://x.io/a/?utm_source=1",
            "HTTP://X.IO//",
            "https://x.io/a?next=/&utm_medium=m",
            "https://x.io/a?b=1&/",
            "",
            "  ",
            "https://x.io/?&&",
        ];
        for input in inputs {
            let once = normalize_url(input);
            assert_eq!(normalize_url(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn fingerprint_stable_under_case_and_whitespace() {
        let mut a = CatalogRecord::new("Example  API", "https://api.example.com/v1");
        a.category = "Finance ".into();
        let mut b = CatalogRecord::new(" example api", "https://API.example.com/v1/");
        b.category = "  FINANCE".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_by_category() {
        let mut a = CatalogRecord::new("Example", "https://x.io");
        a.category = "Finance".into();
        let mut b = a.clone();
        b.category = "Weather".into();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
