//! Scored phone matching between a provider contact identifier and the
//! known-client directory.

use std::sync::Arc;

use {async_trait::async_trait, tracing::{debug, warn}};

use atendo_chats::IdentityLinker;

use crate::{
    directory::{ContactDirectory, ContactRecord},
    normalize::normalize_phone,
};

/// Minimum score required to link. Anything below, or a tie between two
/// different clients, stays unlinked.
const CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Score two normalized phone keys.
///
/// Exact equality is certain; otherwise long common suffixes score lower as
/// they shorten (country-code and trunk-prefix variants of the same number
/// share a long suffix). Anything shorter than 8 digits is noise.
fn match_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    for (len, score) in [(11, 0.95), (10, 0.9), (9, 0.85), (8, 0.8)] {
        if a.len() >= len && b.len() >= len && a[a.len() - len..] == b[b.len() - len..] {
            return score;
        }
    }
    0.0
}

/// Pick the unique best-scoring candidate at or above the threshold.
pub fn best_match(normalized: &str, candidates: &[ContactRecord]) -> Option<String> {
    let mut best: Option<(&ContactRecord, f64)> = None;
    let mut ambiguous = false;

    for candidate in candidates {
        let score = match_score(normalized, &normalize_phone(&candidate.phone));
        if score < CONFIDENCE_THRESHOLD {
            continue;
        }
        match best {
            None => best = Some((candidate, score)),
            Some((_, best_score)) if score > best_score => {
                best = Some((candidate, score));
                ambiguous = false;
            },
            // Two different clients at the same confidence: refuse to guess.
            Some((current, best_score)) if score == best_score && current.id != candidate.id => {
                ambiguous = true;
            },
            Some(_) => {},
        }
    }

    if ambiguous {
        return None;
    }
    best.map(|(record, _)| record.id.clone())
}

/// [`IdentityLinker`] backed by scored phone matching against a
/// [`ContactDirectory`].
pub struct PhoneLinker {
    directory: Arc<dyn ContactDirectory>,
}

impl PhoneLinker {
    pub fn new(directory: Arc<dyn ContactDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl IdentityLinker for PhoneLinker {
    async fn link(&self, external_contact_id: &str) -> Option<String> {
        let needle = normalize_phone(external_contact_id);
        if needle.is_empty() {
            return None;
        }
        let candidates = match self.directory.list().await {
            Ok(c) => c,
            Err(e) => {
                // Advisory only: a failed lookup must never block ingestion.
                warn!(error = %e, "contact directory lookup failed; leaving chat unlinked");
                return None;
            },
        };
        let linked = best_match(&needle, &candidates);
        debug!(contact = %external_contact_id, linked = ?linked, "identity resolution");
        linked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, phone: &str) -> ContactRecord {
        ContactRecord {
            id: id.into(),
            name: id.into(),
            phone: phone.into(),
        }
    }

    #[test]
    fn exact_match_links() {
        let candidates = [record("c1", "5511999990000"), record("c2", "5511888880000")];
        assert_eq!(
            best_match("5511999990000", &candidates),
            Some("c1".to_string())
        );
    }

    #[test]
    fn suffix_match_links_across_country_prefix() {
        // Directory holds the local form; the provider sends it with the
        // country code prepended.
        let candidates = [record("c1", "11 99999-0000")];
        assert_eq!(
            best_match("5511999990000", &candidates),
            Some("c1".to_string())
        );
    }

    #[test]
    fn short_overlap_stays_unlinked() {
        let candidates = [record("c1", "990000")];
        assert_eq!(best_match("5511999990000", &candidates), None);
    }

    #[test]
    fn ambiguous_top_score_stays_unlinked() {
        // Two different clients registered with the same number.
        let candidates = [record("c1", "5511999990000"), record("c2", "5511999990000")];
        assert_eq!(best_match("5511999990000", &candidates), None);
    }

    #[test]
    fn duplicate_rows_for_same_client_still_link() {
        let candidates = [record("c1", "5511999990000"), record("c1", "5511999990000")];
        assert_eq!(
            best_match("5511999990000", &candidates),
            Some("c1".to_string())
        );
    }

    #[test]
    fn higher_score_wins_over_threshold_match() {
        let candidates = [
            record("c-suffix", "11999990000"),  // 11-digit suffix match, 0.95
            record("c-exact", "5511999990000"), // exact, 1.0
        ];
        assert_eq!(
            best_match("5511999990000", &candidates),
            Some("c-exact".to_string())
        );
    }

    #[test]
    fn empty_needle_never_links() {
        let candidates = [record("c1", "5511999990000")];
        assert_eq!(best_match("", &candidates), None);
    }
}
