use crate::hierarchy::Hierarchy;
use capgraph_core::NodeId;
use serde::Serialize;
use std::cmp::Ordering;

/// Score a free-text query against one target field. Ladder, first applicable
/// rule wins:
///   1.0  separator-normalized exact equality
///   0.9  target contains the whole query
///   word pass otherwise: every query word must score against some target
///        word (substring 0.9, short-word substring and prefix 0.7, close
///        typo 0.5), overall score is the mean of the per-word bests.
pub fn fuzzy_score(target: &str, query: &str) -> f64 {
    let target = normalize(target);
    let query = normalize(query);
    if target.is_empty() || query.is_empty() {
        return 0.0;
    }
    if target == query {
        return 1.0;
    }
    if target.contains(&query) {
        return 0.9;
    }

    let query_words: Vec<&str> = query
        .split_whitespace()
        .filter(|word| word.chars().count() > 1)
        .collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let target_words: Vec<&str> = target.split_whitespace().collect();

    let mut total = 0.0;
    for query_word in &query_words {
        let best = target_words
            .iter()
            .map(|target_word| word_score(target_word, query_word))
            .fold(0.0, f64::max);
        if best <= 0.0 {
            return 0.0;
        }
        total += best;
    }
    total / query_words.len() as f64
}

fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_score(target_word: &str, query_word: &str) -> f64 {
    let query_len = query_word.chars().count();
    if target_word.contains(query_word) {
        // fragments under four chars cap at the weak tier
        return if query_len >= 4 { 0.9 } else { 0.7 };
    }
    if target_word.starts_with(query_word) || query_word.starts_with(target_word) {
        return 0.7;
    }
    typo_score(target_word, query_word, query_len)
}

/// Positional character differences plus length difference; two total is
/// close enough for a typo match on reasonably long query words.
fn typo_score(target_word: &str, query_word: &str, query_len: usize) -> f64 {
    let target_len = target_word.chars().count();
    let length_diff = target_len.abs_diff(query_len);
    if length_diff > 2 || query_len < 4 {
        return 0.0;
    }
    let mismatches = target_word
        .chars()
        .zip(query_word.chars())
        .filter(|(a, b)| a != b)
        .count();
    if mismatches + length_diff <= 2 {
        0.5
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: NodeId,
    pub score: f64,
}

/// Rank capabilities against a query across name, description, qualified
/// name, member tool names and server names, keeping the best field score per
/// capability. Hits come back sorted by score (id tie-break) and truncated.
pub fn search(hierarchy: &Hierarchy, query: &str, limit: usize) -> Vec<SearchHit> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = Vec::new();
    for cap in hierarchy.capabilities.values() {
        let mut best = fuzzy_score(&cap.name, query)
            .max(fuzzy_score(&cap.description, query))
            .max(fuzzy_score(&hierarchy.qualified_name(&cap.id), query));
        for tool in &cap.tools {
            best = best
                .max(fuzzy_score(&tool.name, query))
                .max(fuzzy_score(&tool.server, query));
        }
        if best > 0.0 {
            hits.push(SearchHit {
                id: cap.id.clone(),
                score: best,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit.max(1));
    hits
}
