//! Pairwise tag similarity.
//!
//! `compute_pairwise_similarity` concatenates three proposal sources
//! (synonym rules, mechanical string distance, optional semantic cosine),
//! deduplicates by `(alias, canonical)` and returns them sorted by
//! confidence, highest first. For mechanical and semantic proposals the
//! canonical side is the more frequent tag; ties go to the
//! lexicographically smaller one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use polish_core::vecmath::{cosine_similarity, normalized_levenshtein};

use crate::cache::EmbeddingCache;
use crate::provider::EmbeddingProvider;

/// Configured similarity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    Levenshtein,
    Embedding,
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMethod::Levenshtein => write!(f, "levenshtein"),
            SimilarityMethod::Embedding => write!(f, "embedding"),
        }
    }
}

/// How a proposal was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    SynonymRule,
    Levenshtein,
    Embedding,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMethod::SynonymRule => write!(f, "synonym_rule"),
            MergeMethod::Levenshtein => write!(f, "levenshtein"),
            MergeMethod::Embedding => write!(f, "embedding"),
        }
    }
}

/// A proposed alias → canonical merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeProposal {
    pub canonical: String,
    pub alias: String,
    pub confidence: f64,
    pub method: MergeMethod,
}

/// Proposals plus the method that actually ran (semantic degrades to
/// mechanical when the provider is missing or fails).
#[derive(Debug, Clone)]
pub struct SimilarityOutcome {
    pub proposals: Vec<MergeProposal>,
    pub method_used: SimilarityMethod,
    pub warnings: Vec<String>,
}

/// Similarity configuration for one run.
pub struct SimilarityEngine {
    pub method: SimilarityMethod,
    pub threshold: f64,
    /// Ordered rules: `[preferred, alt1, alt2, …]`.
    pub synonyms: Vec<Vec<String>>,
    pub batch_size: usize,
}

impl SimilarityEngine {
    pub fn compute_pairwise_similarity(
        &self,
        tags: &[String],
        counts: &BTreeMap<String, usize>,
        embeddings: Option<(&EmbeddingCache, &dyn EmbeddingProvider)>,
    ) -> SimilarityOutcome {
        let mut sorted_tags: Vec<String> = tags.to_vec();
        sorted_tags.sort();
        sorted_tags.dedup();

        let mut proposals = Vec::new();
        let mut warnings = Vec::new();
        let mut method_used = SimilarityMethod::Levenshtein;

        proposals.extend(self.synonym_proposals(&sorted_tags));
        proposals.extend(self.mechanical_proposals(&sorted_tags, counts));

        if self.method == SimilarityMethod::Embedding {
            match embeddings {
                Some((cache, provider)) => {
                    match self.semantic_proposals(&sorted_tags, counts, cache, provider) {
                        Ok(semantic) => {
                            proposals.extend(semantic);
                            method_used = SimilarityMethod::Embedding;
                        }
                        Err(e) => warnings.push(format!(
                            "semantic similarity unavailable, falling back to mechanical: {e}"
                        )),
                    }
                }
                None => warnings.push(
                    "embedding method configured but no provider available; using mechanical similarity"
                        .to_string(),
                ),
            }
        }

        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        proposals.retain(|p| seen.insert((p.alias.clone(), p.canonical.clone())));
        proposals.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.canonical.cmp(&b.canonical))
                .then_with(|| a.alias.cmp(&b.alias))
        });

        SimilarityOutcome {
            proposals,
            method_used,
            warnings,
        }
    }

    fn synonym_proposals(&self, tags: &[String]) -> Vec<MergeProposal> {
        let present = |t: &String| tags.binary_search(t).is_ok();
        let mut out = Vec::new();

        for rule in &self.synonyms {
            let Some((preferred, alts)) = rule.split_first() else {
                continue;
            };
            if present(preferred) {
                for alt in alts {
                    if present(alt) && alt != preferred {
                        out.push(rule_proposal(preferred, alt));
                    }
                }
            } else {
                // Preferred tag absent: promote the first present alternative.
                let present_alts: Vec<&String> = alts.iter().filter(|a| present(*a)).collect();
                if present_alts.len() >= 2 {
                    let promoted = present_alts[0];
                    for alt in &present_alts[1..] {
                        if *alt != promoted {
                            out.push(rule_proposal(promoted, alt));
                        }
                    }
                }
            }
        }
        out
    }

    fn mechanical_proposals(
        &self,
        tags: &[String],
        counts: &BTreeMap<String, usize>,
    ) -> Vec<MergeProposal> {
        let mut out = Vec::new();
        for i in 0..tags.len() {
            for j in i + 1..tags.len() {
                let (a, b) = (&tags[i], &tags[j]);
                if should_skip_pair(a, b) {
                    continue;
                }
                let score = mechanical_score(a, b);
                if score >= self.threshold {
                    let (canonical, alias) = orient(a, b, counts);
                    out.push(MergeProposal {
                        canonical,
                        alias,
                        confidence: score,
                        method: MergeMethod::Levenshtein,
                    });
                }
            }
        }
        out
    }

    fn semantic_proposals(
        &self,
        tags: &[String],
        counts: &BTreeMap<String, usize>,
        cache: &EmbeddingCache,
        provider: &dyn EmbeddingProvider,
    ) -> anyhow::Result<Vec<MergeProposal>> {
        let vectors = cache.get_embeddings(tags, provider, self.batch_size)?;
        let mut out = Vec::new();
        for i in 0..tags.len() {
            for j in i + 1..tags.len() {
                let (a, b) = (&tags[i], &tags[j]);
                if should_skip_pair(a, b) {
                    continue;
                }
                let (Some(va), Some(vb)) = (vectors.get(a), vectors.get(b)) else {
                    continue;
                };
                let score = cosine_similarity(va, vb)?;
                if score >= self.threshold {
                    let (canonical, alias) = orient(a, b, counts);
                    out.push(MergeProposal {
                        canonical,
                        alias,
                        confidence: score,
                        method: MergeMethod::Embedding,
                    });
                }
            }
        }
        Ok(out)
    }
}

fn rule_proposal(canonical: &str, alias: &str) -> MergeProposal {
    MergeProposal {
        canonical: canonical.to_string(),
        alias: alias.to_string(),
        confidence: 1.0,
        method: MergeMethod::SynonymRule,
    }
}

/// Pick canonical by frequency; ties go to the lexicographically smaller
/// tag (`a < b` holds for callers iterating sorted pairs).
fn orient(a: &str, b: &str, counts: &BTreeMap<String, usize>) -> (String, String) {
    let ca = counts.get(a).copied().unwrap_or(0);
    let cb = counts.get(b).copied().unwrap_or(0);
    if cb > ca {
        (b.to_string(), a.to_string())
    } else {
        (a.to_string(), b.to_string())
    }
}

/// Cheap pre-filter: skip a pair when it cannot plausibly merge.
///
/// All three must hold: no containment either way, length difference above
/// half the longer length, and no shared character among the first three of
/// each.
pub fn should_skip_pair(a: &str, b: &str) -> bool {
    if a.contains(b) || b.contains(a) {
        return false;
    }
    let la = a.chars().count() as f64;
    let lb = b.chars().count() as f64;
    if (la - lb).abs() <= 0.5 * la.max(lb) {
        return false;
    }
    let head_a: Vec<char> = a.chars().take(3).collect();
    let head_b: Vec<char> = b.chars().take(3).collect();
    if head_a.iter().any(|c| head_b.contains(c)) {
        return false;
    }
    true
}

/// Levenshtein base score plus containment, abbreviation and common-prefix
/// bonuses, capped at 1.0.
fn mechanical_score(a: &str, b: &str) -> f64 {
    let mut score = 1.0 - normalized_levenshtein(a, b);

    if a.contains(b) || b.contains(a) {
        score += 0.25;
        let (shorter, longer) = if a.chars().count() <= b.chars().count() {
            (a, b)
        } else {
            (b, a)
        };
        // Abbreviation rule: `py` ↔ `python` should clear a 0.8 threshold.
        if shorter.chars().count() <= 3 && longer.starts_with(shorter) {
            score += 0.5;
        }
    }

    if common_prefix_len(a, b) >= 3 {
        score += 0.30;
    }

    score.min(1.0)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use tempfile::tempdir;

    fn engine(method: SimilarityMethod, threshold: f64, synonyms: Vec<Vec<String>>) -> SimilarityEngine {
        SimilarityEngine {
            method,
            threshold,
            synonyms,
            batch_size: 10,
        }
    }

    fn counts(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(t, c)| (t.to_string(), *c)).collect()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn skip_heuristic_requires_all_three_conditions() {
        // Containment always disables skipping.
        assert!(!should_skip_pair("py", "python"));
        // Similar lengths disable skipping.
        assert!(!should_skip_pair("abc", "xyz"));
        // Shared head character disables skipping.
        assert!(!should_skip_pair("xab", "xyz1234"));
        // All conditions hold: skip.
        assert!(should_skip_pair("abc", "xyz1234"));
    }

    #[test]
    fn abbreviation_bonus_lets_py_merge_into_python() {
        let e = engine(SimilarityMethod::Levenshtein, 0.8, Vec::new());
        let outcome = e.compute_pairwise_similarity(
            &tags(&["py", "python"]),
            &counts(&[("py", 5), ("python", 10)]),
            None,
        );

        assert_eq!(outcome.proposals.len(), 1);
        let p = &outcome.proposals[0];
        assert_eq!(p.canonical, "python");
        assert_eq!(p.alias, "py");
        assert_eq!(p.method, MergeMethod::Levenshtein);
        assert!(p.confidence >= 0.8, "confidence {}", p.confidence);
    }

    #[test]
    fn common_prefix_bonus_merges_trade_into_trading() {
        let e = engine(SimilarityMethod::Levenshtein, 0.8, Vec::new());
        let outcome = e.compute_pairwise_similarity(
            &tags(&["trade", "trading"]),
            &counts(&[("trade", 1), ("trading", 3)]),
            None,
        );

        assert_eq!(outcome.proposals.len(), 1);
        let p = &outcome.proposals[0];
        assert_eq!(p.canonical, "trading");
        assert_eq!(p.alias, "trade");
        // 1 - 3/7 + 0.30 prefix bonus.
        assert!((p.confidence - (1.0 - 3.0 / 7.0 + 0.30)).abs() < 1e-9);
    }

    #[test]
    fn unrelated_tags_produce_no_proposals() {
        let e = engine(SimilarityMethod::Levenshtein, 0.8, Vec::new());
        let outcome = e.compute_pairwise_similarity(
            &tags(&["health", "trading"]),
            &counts(&[("health", 2), ("trading", 2)]),
            None,
        );
        assert!(outcome.proposals.is_empty());
    }

    #[test]
    fn synonym_rule_with_preferred_present_wins_over_mechanical() {
        let e = engine(
            SimilarityMethod::Levenshtein,
            0.8,
            vec![vec!["trading".to_string(), "trade".to_string()]],
        );
        let outcome = e.compute_pairwise_similarity(
            &tags(&["trade", "trading"]),
            &counts(&[("trade", 1), ("trading", 3)]),
            None,
        );

        // Mechanical also proposes this pair; dedup keeps the rule.
        assert_eq!(outcome.proposals.len(), 1);
        let p = &outcome.proposals[0];
        assert_eq!(p.method, MergeMethod::SynonymRule);
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.canonical, "trading");
    }

    #[test]
    fn synonym_rule_promotes_first_present_alt_when_preferred_absent() {
        let e = engine(
            SimilarityMethod::Levenshtein,
            0.99,
            vec![vec![
                "finance".to_string(),
                "stocks".to_string(),
                "equities".to_string(),
            ]],
        );
        let outcome = e.compute_pairwise_similarity(
            &tags(&["equities", "stocks"]),
            &counts(&[("equities", 1), ("stocks", 4)]),
            None,
        );

        assert_eq!(outcome.proposals.len(), 1);
        let p = &outcome.proposals[0];
        assert_eq!(p.canonical, "stocks");
        assert_eq!(p.alias, "equities");
        assert_eq!(p.method, MergeMethod::SynonymRule);
    }

    #[test]
    fn orientation_tie_breaks_lexicographically() {
        let oriented = orient("alpha2", "alpha3", &counts(&[("alpha2", 2), ("alpha3", 2)]));
        assert_eq!(oriented, ("alpha2".to_string(), "alpha3".to_string()));
    }

    #[test]
    fn proposals_are_sorted_by_confidence_descending() {
        let e = engine(
            SimilarityMethod::Levenshtein,
            0.8,
            vec![vec!["health".to_string(), "wellness".to_string()]],
        );
        let outcome = e.compute_pairwise_similarity(
            &tags(&["health", "trade", "trading", "wellness"]),
            &counts(&[("health", 5), ("wellness", 1), ("trade", 1), ("trading", 3)]),
            None,
        );

        assert!(outcome.proposals.len() >= 2);
        for pair in outcome.proposals.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        assert_eq!(outcome.proposals[0].method, MergeMethod::SynonymRule);
    }

    struct DirectionalProvider;

    impl EmbeddingProvider for DirectionalProvider {
        fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            // Tags starting with the same letter point the same way.
            Ok(batch
                .iter()
                .map(|t| match t.as_bytes().first() {
                    Some(b'c') => vec![1.0, 0.0],
                    _ => vec![0.0, 1.0],
                })
                .collect())
        }

        fn model_version(&self) -> String {
            "fake/dir".to_string()
        }
    }

    #[test]
    fn semantic_pass_merges_cosine_similar_tags() {
        let dir = tempdir().expect("tempdir");
        let cache = EmbeddingCache::new(&dir.path().join("embeddings.db"), "fake/dir");
        let provider = DirectionalProvider;

        let e = engine(SimilarityMethod::Embedding, 0.9, Vec::new());
        let outcome = e.compute_pairwise_similarity(
            &tags(&["caffeine", "coffee", "running"]),
            &counts(&[("caffeine", 1), ("coffee", 4), ("running", 2)]),
            Some((&cache, &provider as &dyn EmbeddingProvider)),
        );

        assert_eq!(outcome.method_used, SimilarityMethod::Embedding);
        let semantic: Vec<_> = outcome
            .proposals
            .iter()
            .filter(|p| p.method == MergeMethod::Embedding)
            .collect();
        assert_eq!(semantic.len(), 1);
        assert_eq!(semantic[0].canonical, "coffee");
        assert_eq!(semantic[0].alias, "caffeine");
        assert!(semantic[0].confidence > 0.99);
    }

    struct DownProvider;

    impl EmbeddingProvider for DownProvider {
        fn embed(&self, _batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Unreachable("backend offline".into()))
        }

        fn model_version(&self) -> String {
            "fake/down".to_string()
        }
    }

    #[test]
    fn provider_failure_falls_back_to_mechanical_with_warning() {
        let dir = tempdir().expect("tempdir");
        let cache = EmbeddingCache::new(&dir.path().join("embeddings.db"), "fake/down");

        let e = engine(SimilarityMethod::Embedding, 0.8, Vec::new());
        let outcome = e.compute_pairwise_similarity(
            &tags(&["trade", "trading"]),
            &counts(&[("trade", 1), ("trading", 3)]),
            Some((&cache, &DownProvider as &dyn EmbeddingProvider)),
        );

        assert_eq!(outcome.method_used, SimilarityMethod::Levenshtein);
        assert_eq!(outcome.warnings.len(), 1);
        // Mechanical proposals still present.
        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].method, MergeMethod::Levenshtein);
    }
}
