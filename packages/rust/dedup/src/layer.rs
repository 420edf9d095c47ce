//! Within-batch deduplication of one adapter's output.

use std::collections::HashSet;

use apicatalog_shared::CatalogRecord;
use tracing::debug;

use crate::normalize::{fingerprint, normalize_url};

/// Seen-sets for one deduplication pass.
///
/// A fresh context is created per [`LayerDeduplicator::dedupe`] call, so the
/// deduplicator itself carries no state between batches.
#[derive(Debug, Default)]
pub struct DedupeContext {
    urls: HashSet<String>,
    fingerprints: HashSet<String>,
}

impl DedupeContext {
    /// Record `record` as observed. Returns `false` if its normalized URL or
    /// its fingerprint was already seen in this context.
    pub fn observe(&mut self, record: &CatalogRecord) -> bool {
        let url = normalize_url(&record.url);
        let print = fingerprint(record);

        // Empty URLs carry no identity; the store rejects those records later.
        let url_seen = !url.is_empty() && self.urls.contains(&url);
        if url_seen || self.fingerprints.contains(&print) {
            return false;
        }

        if !url.is_empty() {
            self.urls.insert(url);
        }
        self.fingerprints.insert(print);
        true
    }
}

/// Result of deduplicating one batch.
#[derive(Debug, Clone, Default)]
pub struct LayerDedupe {
    /// First-seen-unique records, in input order.
    pub records: Vec<CatalogRecord>,
    /// How many records were dropped as duplicates.
    pub duplicates: usize,
}

/// Shrinks one adapter's batch to first-seen-unique records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerDeduplicator;

impl LayerDeduplicator {
    /// Drop every record whose normalized URL or fingerprint already appeared
    /// earlier in `batch`. First occurrence wins; survivor order matches input.
    pub fn dedupe(&self, batch: Vec<CatalogRecord>) -> LayerDedupe {
        let mut ctx = DedupeContext::default();
        let input_len = batch.len();

        let records: Vec<CatalogRecord> = batch
            .into_iter()
            .filter(|record| ctx.observe(record))
            .collect();

        let duplicates = input_len - records.len();
        debug!(input = input_len, unique = records.len(), duplicates, "layer dedupe");

        LayerDedupe {
            records,
            duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, url: &str, category: &str) -> CatalogRecord {
        let mut r = CatalogRecord::new(name, url);
        r.category = category.into();
        r
    }

    #[test]
    fn first_occurrence_wins_and_order_is_kept() {
        let batch = vec![
            record("Alpha", "https://a.io", "x"),
            record("Beta", "https://b.io", "x"),
            record("Alpha Again", "https://a.io/", "y"),
            record("Gamma", "https://c.io", "x"),
        ];
        let out = LayerDeduplicator.dedupe(batch);
        let names: Vec<&str> = out.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn tracking_params_do_not_defeat_dedupe() {
        let batch = vec![
            record("Alpha", "https://a.io/api", ""),
            record("Alpha", "https://a.io/api?utm_source=newsletter", ""),
        ];
        let out = LayerDeduplicator.dedupe(batch);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn no_two_survivors_share_url_or_fingerprint() {
        let batch: Vec<CatalogRecord> = (0..50)
            .map(|i| record(&format!("API {}", i % 7), &format!("https://x.io/{}", i % 11), "c"))
            .collect();
        let input_len = batch.len();
        let out = LayerDeduplicator.dedupe(batch);
        assert!(out.records.len() <= input_len);

        let urls: HashSet<String> = out.records.iter().map(|r| normalize_url(&r.url)).collect();
        let prints: HashSet<String> = out.records.iter().map(fingerprint).collect();
        assert_eq!(urls.len(), out.records.len());
        assert_eq!(prints.len(), out.records.len());
        assert_eq!(out.records.len() + out.duplicates, input_len);
    }

    #[test]
    fn separate_calls_do_not_share_state() {
        let dedup = LayerDeduplicator;
        let first = dedup.dedupe(vec![record("Alpha", "https://a.io", "")]);
        let second = dedup.dedupe(vec![record("Alpha", "https://a.io", "")]);
        assert_eq!(first.records.len(), 1);
        assert_eq!(second.records.len(), 1);
    }

    #[test]
    fn empty_urls_are_passed_through_unless_fingerprints_match() {
        let batch = vec![
            record("One", "", ""),
            record("Two", "", ""),
            record("One", "", ""),
        ];
        let out = LayerDeduplicator.dedupe(batch);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn empty_batch() {
        let out = LayerDeduplicator.dedupe(Vec::new());
        assert!(out.records.is_empty());
        assert_eq!(out.duplicates, 0);
    }
}
