//! Memory retrieval under a character budget.
//!
//! Relevance is a deterministic heuristic: the share of the query's terms
//! that appear in a snippet, nudged by the snippet's importance. Ranking is a
//! total order (score, then newer first, then insertion order), so the same
//! store, query and budget always select the same snippets.

use memloop_core::error::StorageError;
use memloop_core::memory::MemoryStore;
use memloop_core::{MemorySnippet, UserId};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Weight of a snippet's importance relative to full term overlap (1.0).
pub const IMPORTANCE_WEIGHT: f32 = 0.25;

/// Words too common to signal relevance.
const STOPWORDS: &[&str] = &[
    "about", "all", "an", "and", "any", "are", "as", "at", "be", "but", "by", "can", "could",
    "did", "do", "does", "for", "from", "had", "has", "have", "how", "if", "in", "into", "is",
    "it", "its", "me", "my", "no", "not", "of", "on", "or", "our", "so", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "up", "was", "we", "were",
    "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// A snippet together with the score it was ranked by.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSnippet {
    pub snippet: MemorySnippet,
    pub score: f32,
}

/// Lowercased alphanumeric terms of `text`, without stopwords and
/// single characters.
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Relevance of `snippet` to a query already split into `query_terms`.
pub fn score(query_terms: &HashSet<String>, snippet: &MemorySnippet) -> f32 {
    let overlap = if query_terms.is_empty() {
        0.0
    } else {
        let snippet_terms = terms(&snippet.text);
        let shared = query_terms.intersection(&snippet_terms).count();
        shared as f32 / query_terms.len() as f32
    };
    overlap + snippet.importance.unwrap_or(0.0) * IMPORTANCE_WEIGHT
}

/// Total order used for ranking: higher score, newer, then earlier insertion.
fn rank_order(a: &ScoredSnippet, b: &ScoredSnippet) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.snippet.created_at.cmp(&a.snippet.created_at))
        .then_with(|| a.snippet.ordinal.cmp(&b.snippet.ordinal))
}

/// Score and sort `snippets` for `query`.
pub fn rank(query: &str, snippets: Vec<MemorySnippet>) -> Vec<ScoredSnippet> {
    let query_terms = terms(query);
    let mut scored: Vec<ScoredSnippet> = snippets
        .into_iter()
        .map(|snippet| ScoredSnippet {
            score: score(&query_terms, &snippet),
            snippet,
        })
        .collect();
    scored.sort_by(rank_order);
    scored
}

/// Accept ranked snippets in order until the next one would overflow
/// `budget` characters.
pub fn select_within_budget(ranked: Vec<ScoredSnippet>, budget: usize) -> Vec<ScoredSnippet> {
    let mut used = 0;
    let mut selected = Vec::new();
    for candidate in ranked {
        let len = candidate.snippet.char_len();
        if used + len > budget {
            break;
        }
        used += len;
        selected.push(candidate);
    }
    selected
}

/// Selects the snippets of one user worth injecting into a new turn.
#[derive(Clone)]
pub struct MemoryRetriever {
    store: Arc<dyn MemoryStore>,
    lookback: usize,
    min_score: f32,
}

impl MemoryRetriever {
    pub fn new(store: Arc<dyn MemoryStore>, lookback: usize) -> Self {
        Self {
            store,
            lookback,
            min_score: 0.0,
        }
    }

    /// Drop snippets scoring below `min_score` before budgeting.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Snippets for `user` relevant to `query`, best first, whose combined
    /// text fits in `budget` characters. Empty when the user has none.
    pub async fn retrieve(
        &self,
        user: &UserId,
        query: &str,
        budget: usize,
    ) -> Result<Vec<MemorySnippet>, StorageError> {
        Ok(self
            .retrieve_scored(user, query, budget)
            .await?
            .into_iter()
            .map(|s| s.snippet)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve), keeping the scores.
    pub async fn retrieve_scored(
        &self,
        user: &UserId,
        query: &str,
        budget: usize,
    ) -> Result<Vec<ScoredSnippet>, StorageError> {
        let candidates = self.store.recent(user, self.lookback).await?;
        let scanned = candidates.len();
        if scanned == 0 {
            return Ok(Vec::new());
        }

        let ranked: Vec<ScoredSnippet> = rank(query, candidates)
            .into_iter()
            .filter(|s| s.score >= self.min_score)
            .collect();
        let selected = select_within_budget(ranked, budget);

        debug!(
            user = %user,
            scanned,
            selected = selected.len(),
            budget,
            "Memory retrieved"
        );
        Ok(selected)
    }
}
