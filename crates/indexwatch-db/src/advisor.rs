//! Missing-index advisory: ranks fallback telemetry into index candidates.
//!
//! Pure aggregation over the tracker's current contents — two calls without
//! new events yield identical output. An event contributes when it carries a
//! structured index name, or when its free-text reason matches one of the
//! known "missing index" phrases; everything else is non-actionable and
//! skipped rather than guessed at.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::telemetry::FallbackTracker;

/// First quoted substring of a reason string, in any of the quoting styles
/// the storage layers emit (`'name'`, `"name"`, `` `name` ``).
static QUOTED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|'([^']+)'|`([^`]+)`"#).unwrap());

/// Known human-language phrases meaning "a secondary index is missing".
///
/// Matched case-insensitively as substrings. The set is heuristic and
/// locale-specific, not exhaustive — reasons matching none of these are
/// treated as non-actionable.
const MISSING_INDEX_PHRASES: &[&str] = &[
    // English
    "missing index",
    "index missing",
    "no index",
    "without index",
    "index not found",
    // German
    "index fehlt",
    "fehlender index",
    "kein index",
    // French
    "index manquant",
    "sans index",
    // Spanish
    "sin índice",
    "falta el índice",
    "índice faltante",
];

/// Placeholder index name when a phrase matched but no literal name could be
/// extracted from the reason text.
const UNKNOWN_INDEX: &str = "unknown";

// =============================================================================
// Reason matching
// =============================================================================

/// Pluggable matcher for free-text fallback reasons.
///
/// The default [`PhraseMatcher`] ships a multi-lingual phrase set; hosts with
/// other locales substitute their own matcher instead of widening ours.
pub trait ReasonMatcher: Send + Sync {
    /// Whether the reason text indicates a missing secondary index.
    fn is_missing_index(&self, reason: &str) -> bool;

    /// Extract a literal index name from the reason, if one is present.
    fn extract_index_name(&self, reason: &str) -> Option<String> {
        first_quoted_name(reason)
    }
}

/// Substring matcher over a fixed, lowercased phrase list.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrases: Vec<String>,
}

impl Default for PhraseMatcher {
    fn default() -> Self {
        Self {
            phrases: MISSING_INDEX_PHRASES
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }
}

impl PhraseMatcher {
    /// Build a matcher over a custom phrase set (lowercased internally).
    #[must_use]
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl ReasonMatcher for PhraseMatcher {
    fn is_missing_index(&self, reason: &str) -> bool {
        let lower = reason.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

/// First quoted substring of `reason`, across quote styles.
fn first_quoted_name(reason: &str) -> Option<String> {
    let captures = QUOTED_NAME.captures(reason)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))
        .map(|m| m.as_str().to_string())
}

// =============================================================================
// Candidates
// =============================================================================

/// An aggregated, ranked suggestion that a (database, store, index)
/// combination should have an index created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub database: String,
    pub store: String,
    pub index: String,
    pub count: u64,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{} (count: {})",
            self.database, self.store, self.index, self.count
        )
    }
}

/// Rank the tracker's buffered fallbacks into missing-index candidates using
/// the default [`PhraseMatcher`].
///
/// Candidates are ordered by descending count; ties preserve the order in
/// which the (database, store, index) key was first observed.
#[must_use]
pub fn missing_index_candidates(tracker: &FallbackTracker) -> Vec<Candidate> {
    candidates_with_matcher(tracker, &PhraseMatcher::default())
}

/// Rank candidates with a caller-supplied [`ReasonMatcher`].
///
/// Degrades to an empty list if the matcher misbehaves (panics) — one bad
/// aggregate never blocks the advisory report.
#[must_use]
pub fn candidates_with_matcher(
    tracker: &FallbackTracker,
    matcher: &dyn ReasonMatcher,
) -> Vec<Candidate> {
    let result = catch_unwind(AssertUnwindSafe(|| rank(tracker, matcher)));
    match result {
        Ok(candidates) => candidates,
        Err(_) => {
            tracing::warn!("reason matcher panicked while ranking; returning no candidates");
            Vec::new()
        }
    }
}

fn rank(tracker: &FallbackTracker, matcher: &dyn ReasonMatcher) -> Vec<Candidate> {
    let snapshot = tracker.snapshot();

    // IndexMap preserves first-insertion order, which makes the tie-break
    // stable without a second bookkeeping pass.
    let mut counts: IndexMap<(String, String, String), u64> = IndexMap::new();

    for event in &snapshot.events {
        let index = match event.index.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                if !matcher.is_missing_index(&event.reason) {
                    // Non-actionable: no structured name and no recognized
                    // missing-index phrase.
                    continue;
                }
                matcher
                    .extract_index_name(&event.reason)
                    .unwrap_or_else(|| UNKNOWN_INDEX.to_string())
            }
        };

        let key = (event.database.clone(), event.store.clone(), index);
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut candidates: Vec<Candidate> = counts
        .into_iter()
        .map(|((database, store, index), count)| Candidate {
            database,
            store,
            index,
            count,
        })
        .collect();

    // sort_by is stable: equal counts keep first-observed order.
    candidates.sort_by(|a, b| b.count.cmp(&a.count));
    candidates
}
