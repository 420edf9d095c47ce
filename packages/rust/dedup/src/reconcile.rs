//! Cross-source reconciliation over the whole catalog.
//!
//! Records sharing a normalized URL form one equivalence class. Each class
//! with more than one member collapses to a single canonical record: the
//! highest-scoring member, carrying the merged metadata of every member.

use std::collections::HashMap;

use apicatalog_shared::{CatalogRecord, Metadata};
use tracing::{debug, info};

use crate::normalize::normalize_url;

/// Source substrings and the reputation bonus each one earns.
/// Matched with `contains`, so `publicapis.org/Finance` still scores.
const SOURCE_BONUSES: &[(&str, u32)] = &[
    ("apis.guru", 15),
    ("publicapis.org", 12),
    ("gov", 10),
    ("github", 8),
];

/// Quality score used to pick a canonical record within a duplicate group.
pub fn score(record: &CatalogRecord) -> u32 {
    let mut score = 0;

    let desc_len = record.description.chars().count();
    score += match desc_len {
        n if n > 100 => 10,
        n if n > 50 => 5,
        n if n > 20 => 2,
        _ => 0,
    };

    if !record.category.is_empty() {
        score += 5;
    }
    if has_auth_info(&record.auth_method) {
        score += 3;
    }

    score += SOURCE_BONUSES
        .iter()
        .filter(|(needle, _)| record.source.contains(needle))
        .map(|(_, bonus)| bonus)
        .sum::<u32>();

    if record.url.starts_with("https://") {
        score += 5;
    }
    if record.metadata.len() > 3 {
        score += 5;
    }

    score
}

/// Placeholder auth values that say nothing about the API.
const AUTH_PLACEHOLDERS: &[&str] = &["unknown", "none", "n/a"];

fn has_auth_info(auth: &str) -> bool {
    let auth = auth.trim();
    !auth.is_empty() && !AUTH_PLACEHOLDERS.iter().any(|p| auth.eq_ignore_ascii_case(p))
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Surviving records: singletons unchanged, one canonical per group.
    /// Ordered by each group's first appearance in the input.
    pub records: Vec<CatalogRecord>,
    /// Identity keys of group members that lost to a canonical record.
    pub superseded: Vec<String>,
    /// Canonical records whose metadata changed through the merge.
    pub updated: Vec<CatalogRecord>,
    /// Number of multi-member groups that were collapsed.
    pub groups_merged: usize,
}

impl Reconciliation {
    /// Whether this pass changes nothing.
    pub fn is_noop(&self) -> bool {
        self.superseded.is_empty() && self.updated.is_empty()
    }
}

/// Collapses records sharing a normalized URL into one canonical record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossSourceReconciler;

impl CrossSourceReconciler {
    /// Reconcile `records`, given in discovery order.
    ///
    /// Ties on score go to the member encountered first. Metadata of all
    /// members is folded in discovery order, later keys overwriting earlier
    /// ones; every other field keeps the winner's value.
    pub fn reconcile(&self, records: Vec<CatalogRecord>) -> Reconciliation {
        let input_len = records.len();
        let groups = group_by_url(records);

        let mut out = Reconciliation::default();
        for group in groups {
            if group.len() == 1 {
                out.records.extend(group);
                continue;
            }

            out.groups_merged += 1;
            let winner = pick_canonical(&group);

            let merged: Metadata = group
                .iter()
                .flat_map(|member| member.metadata.iter())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            let mut canonical = group[winner].clone();
            debug!(
                url = %canonical.url,
                members = group.len(),
                source = %canonical.source,
                "collapsed duplicate group"
            );

            for (i, member) in group.iter().enumerate() {
                if i != winner {
                    out.superseded.push(member.identity_key());
                }
            }

            if canonical.metadata != merged {
                canonical.metadata = merged;
                out.updated.push(canonical.clone());
            }
            out.records.push(canonical);
        }

        info!(
            input = input_len,
            output = out.records.len(),
            groups_merged = out.groups_merged,
            "reconciliation pass complete"
        );
        out
    }
}

/// Group records by normalized URL, preserving first-appearance order of
/// groups and discovery order within each group. Records without a URL stay
/// singletons.
fn group_by_url(records: Vec<CatalogRecord>) -> Vec<Vec<CatalogRecord>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<CatalogRecord>> = Vec::new();

    for record in records {
        let key = normalize_url(&record.url);
        if key.is_empty() {
            groups.push(vec![record]);
            continue;
        }
        match index.get(&key) {
            Some(&slot) => groups[slot].push(record),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![record]);
            }
        }
    }
    groups
}

/// Index of the highest-scoring member; the first one wins ties.
fn pick_canonical(group: &[CatalogRecord]) -> usize {
    let mut best = 0;
    let mut best_score = score(&group[0]);
    for (i, member) in group.iter().enumerate().skip(1) {
        let s = score(member);
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}
