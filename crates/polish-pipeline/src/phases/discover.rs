//! Phase 1: hashtag discovery and tag consolidation.
//!
//! Scans the lookback window, aggregates hashtag occurrences per tag,
//! drops tags below `min_tag_frequency`, then asks the similarity engine
//! for ranked merge proposals and folds them into the canonical map.

use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};

use polish_ingest::scanner::find_daily_logs;
use polish_ingest::{extract_hashtags, TagStats};
use polish_similarity::{CanonicalMap, SimilarityEngine};

use crate::phases::{lookback_range, PhaseContext};
use crate::state::RunState;

pub fn run(ctx: &PhaseContext, state: &mut RunState) -> Result<()> {
    ctx.console.phase(1, "discover topics");

    let range = lookback_range(ctx.today, ctx.config.advanced.lookback_days);
    let logs = find_daily_logs(&ctx.paths.memory_dir, Some(range))?;

    let mut discovered: BTreeMap<String, TagStats> = BTreeMap::new();
    for rel in &logs {
        let text = fs::read_to_string(ctx.paths.memory_dir.join(rel))
            .with_context(|| format!("failed to read {rel}"))?;
        for (tag, stats) in extract_hashtags(&text, rel) {
            let merged = discovered.entry(tag).or_default();
            merged.count += stats.count;
            merged.occurrences.extend(stats.occurrences);
        }
    }

    let min_frequency = ctx.config.advanced.min_tag_frequency;
    discovered.retain(|_, stats| stats.count >= min_frequency);

    state.stats.files_scanned = logs.len();
    state.stats.tags_discovered = discovered.len();

    let tags: Vec<String> = discovered.keys().cloned().collect();
    let counts: BTreeMap<String, usize> = discovered
        .iter()
        .map(|(tag, stats)| (tag.clone(), stats.count))
        .collect();

    let engine = SimilarityEngine {
        method: ctx.config.effective_method(),
        threshold: ctx.config.topic_similarity.threshold,
        synonyms: ctx.config.synonyms.clone(),
        batch_size: ctx.config.performance.batch_size,
    };
    let outcome = engine.compute_pairwise_similarity(&tags, &counts, ctx.embeddings);

    for warning in &outcome.warnings {
        ctx.console.warn(warning);
        state.warnings.push(warning.clone());
    }
    for proposal in &outcome.proposals {
        ctx.console.detail(&format!(
            "merge {} → {} ({}, {:.2})",
            proposal.alias, proposal.canonical, proposal.method, proposal.confidence
        ));
    }

    state.similarity_method = outcome.method_used.to_string();
    state.stats.merge_proposals = outcome.proposals.len();
    state.canonical_map = CanonicalMap::build(&counts, &outcome.proposals);
    state.merge_proposals = outcome.proposals;
    state.discovered_topics = discovered;

    ctx.console.done(&format!(
        "{} files, {} tags, {} merge proposals ({})",
        state.stats.files_scanned,
        state.stats.tags_discovered,
        state.stats.merge_proposals,
        state.similarity_method
    ));
    Ok(())
}
