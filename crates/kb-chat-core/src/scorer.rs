//! Relevance scoring of a free-text question against the knowledge index.
//!
//! # Scoring
//!
//! For every indexed entry three signals are computed from the normalized
//! query `q` and its tokens `T`:
//!
//! | Signal | Value |
//! |--------|-------|
//! | direct question match | `1.0` if `q` is a substring of the normalized question |
//! | containment match | `0.95` if `q` is a substring of the normalized searchable text |
//! | overlap ratio | tokens of `T` found in the entry's token set ÷ `|T|` |
//!
//! `score = max(direct, containment, overlap)`. The entry with the strictly
//! highest score wins, so ties resolve to the earliest entry in index order.
//!
//! # Acceptance
//!
//! The winner is returned only if its overlap count reaches
//! [`MatchPolicy::min_overlap`] or its score reaches
//! [`MatchPolicy::min_score`]. A one-token query that fully overlaps scores
//! `1.0` and therefore passes through the score branch.

use serde::Serialize;

use crate::index::{IndexedEntry, KnowledgeEntry, KnowledgeIndex};
use crate::normalize::normalize;
use crate::tokenize::tokenize;

const DIRECT_MATCH_SCORE: f64 = 1.0;
const CONTAINMENT_SCORE: f64 = 0.95;

/// Acceptance thresholds for the best-scoring entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Minimum number of overlapping query tokens.
    pub min_overlap: usize,
    /// Minimum blended score.
    pub min_score: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_overlap: 2,
            min_score: 0.55,
        }
    }
}

impl MatchPolicy {
    pub fn accepts(&self, signals: &MatchSignals) -> bool {
        signals.overlap_count >= self.min_overlap || signals.score >= self.min_score
    }
}

/// Per-entry scoring breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSignals {
    pub direct_question_match: f64,
    pub containment_match: f64,
    pub overlap_ratio: f64,
    /// Query tokens (with repetition) present in the entry's token set.
    pub overlap_count: usize,
    pub score: f64,
}

/// An accepted match for a query.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    pub entry: &'a KnowledgeEntry,
    pub score: f64,
    pub overlap_count: usize,
    pub signals: MatchSignals,
}

/// A prepared query: normalized text plus its tokens.
struct Query {
    normalized: String,
    tokens: Vec<String>,
}

impl Query {
    fn new(text: &str) -> Self {
        Self {
            normalized: normalize(text),
            tokens: tokenize(text),
        }
    }
}

fn score_entry(query: &Query, indexed: &IndexedEntry) -> MatchSignals {
    let direct_question_match = if indexed.normalized_question.contains(&query.normalized) {
        DIRECT_MATCH_SCORE
    } else {
        0.0
    };

    // the query is never empty here, so an empty text cannot contain it
    let containment_match = if indexed.normalized_text.contains(&query.normalized) {
        CONTAINMENT_SCORE
    } else {
        0.0
    };

    let overlap_count = query
        .tokens
        .iter()
        .filter(|t| indexed.token_set.contains(*t))
        .count();
    let overlap_ratio = if query.tokens.is_empty() {
        0.0
    } else {
        overlap_count as f64 / query.tokens.len() as f64
    };

    MatchSignals {
        direct_question_match,
        containment_match,
        overlap_ratio,
        overlap_count,
        score: direct_question_match
            .max(containment_match)
            .max(overlap_ratio),
    }
}

/// Score every entry against `query`, in index order.
///
/// Returns an empty list when the index is empty or the query has no
/// tokens. Used for diagnostics; retrieval goes through [`find_best_match`].
pub fn score_entries<'a>(
    index: &'a KnowledgeIndex,
    query: &str,
) -> Vec<(&'a KnowledgeEntry, MatchSignals)> {
    let query = Query::new(query);
    if index.is_empty() || query.tokens.is_empty() {
        return Vec::new();
    }

    index
        .entries()
        .iter()
        .map(|e| (&e.entry, score_entry(&query, e)))
        .collect()
}

/// Find the best-matching entry for `query`, or `None` if nothing passes
/// the acceptance `policy`.
pub fn find_best_match<'a>(
    index: &'a KnowledgeIndex,
    query: &str,
    policy: &MatchPolicy,
) -> Option<MatchResult<'a>> {
    let query = Query::new(query);
    if index.is_empty() || query.tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&IndexedEntry, MatchSignals)> = None;
    for indexed in index.entries() {
        let signals = score_entry(&query, indexed);
        let better = match &best {
            Some((_, top)) => signals.score > top.score,
            None => true,
        };
        if better {
            best = Some((indexed, signals));
        }
    }

    let (indexed, signals) = best?;
    if !policy.accepts(&signals) {
        return None;
    }

    Some(MatchResult {
        entry: &indexed.entry,
        score: signals.score,
        overlap_count: signals.overlap_count,
        signals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;

    fn entry(id: &str, q: &str, a: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            question: q.to_string(),
            answer: a.to_string(),
            combined_text: None,
            metadata: None,
        }
    }

    fn sample_index() -> KnowledgeIndex {
        build_index(vec![
            entry("unasat", "What is UNASAT?", "An org."),
            entry(
                "enroll",
                "How do I enroll in a course?",
                "Register through the student portal before the deadline.",
            ),
            entry(
                "fees",
                "What are the tuition fees?",
                "Tuition fees depend on the study programme.",
            ),
        ])
    }

    #[test]
    fn test_direct_question_match_accepted() {
        let idx = sample_index();
        let m = find_best_match(&idx, "what is unasat", &MatchPolicy::default()).unwrap();
        assert_eq!(m.entry.id, "unasat");
        assert_eq!(m.signals.direct_question_match, 1.0);
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn test_short_tokens_never_match() {
        let idx = sample_index();
        assert!(find_best_match(&idx, "hi ok no", &MatchPolicy::default()).is_none());
        assert!(score_entries(&idx, "hi ok no").is_empty());
    }

    #[test]
    fn test_empty_index_never_matches() {
        let idx = KnowledgeIndex::empty();
        assert!(find_best_match(&idx, "what is unasat", &MatchPolicy::default()).is_none());
    }

    #[test]
    fn test_containment_in_answer() {
        let idx = sample_index();
        let m = find_best_match(&idx, "student portal", &MatchPolicy::default()).unwrap();
        assert_eq!(m.entry.id, "enroll");
        assert_eq!(m.signals.direct_question_match, 0.0);
        assert!((m.signals.containment_match - 0.95).abs() < 1e-9);
        assert!((m.score - 1.0).abs() < 1e-9, "overlap ratio is 1.0 here");
    }

    #[test]
    fn test_paraphrase_by_overlap() {
        let idx = sample_index();
        let m = find_best_match(
            &idx,
            "how much are tuition fees for my programme",
            &MatchPolicy::default(),
        )
        .unwrap();
        assert_eq!(m.entry.id, "fees");
        // how much are tuition fees for programme: are/tuition/fees/programme overlap
        assert_eq!(m.overlap_count, 4);
        assert!((m.score - 4.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        let idx = build_index(vec![
            entry("first", "library opening hours", "Weekdays."),
            entry("second", "library opening hours", "Weekdays."),
        ]);
        for _ in 0..5 {
            let m = find_best_match(&idx, "library hours", &MatchPolicy::default()).unwrap();
            assert_eq!(m.entry.id, "first");
        }
    }

    #[test]
    fn test_single_token_full_overlap_passes_score_gate() {
        let idx = sample_index();
        let m = find_best_match(&idx, "deadline?", &MatchPolicy::default()).unwrap();
        assert_eq!(m.entry.id, "enroll");
        assert_eq!(m.overlap_count, 1);
        assert!(m.score >= 0.55);
    }

    #[test]
    fn test_weak_match_rejected() {
        let idx = sample_index();
        // one of five tokens overlaps: ratio 0.2, overlap 1
        let scored = score_entries(&idx, "weather forecast tomorrow deadline extension");
        let enroll = scored.iter().find(|(e, _)| e.id == "enroll").unwrap().1;
        assert_eq!(enroll.overlap_count, 1);
        assert!(find_best_match(
            &idx,
            "weather forecast tomorrow deadline extension",
            &MatchPolicy::default()
        )
        .is_none());
    }

    #[test]
    fn test_overlap_counts_repeated_query_tokens() {
        let idx = sample_index();
        let scored = score_entries(&idx, "fees fees unknown");
        let fees = scored.iter().find(|(e, _)| e.id == "fees").unwrap().1;
        assert_eq!(fees.overlap_count, 2);
        assert!((fees.overlap_ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_strict_policy_rejects_single_token() {
        let idx = sample_index();
        let strict = MatchPolicy {
            min_overlap: 2,
            min_score: 1.01,
        };
        assert!(find_best_match(&idx, "deadline", &strict).is_none());
    }

    #[test]
    fn test_blank_entry_never_contains_query() {
        let index = build_index(vec![entry("blank", "", "?!")]);
        let scored = score_entries(&index, "what is unasat");
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].1.containment_match, 0.0);
        assert_eq!(scored[0].1.direct_question_match, 0.0);
        assert_eq!(scored[0].1.score, 0.0);
        assert!(find_best_match(&index, "what is unasat", &MatchPolicy::default()).is_none());
    }

    #[test]
    fn test_score_entries_in_index_order() {
        let idx = sample_index();
        let scored = score_entries(&idx, "tuition");
        let ids: Vec<&str> = scored.iter().map(|(e, _)| e.id.as_str()).collect();
        assert_eq!(ids, vec!["unasat", "enroll", "fees"]);
    }
}
