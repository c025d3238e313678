//! Phase 2: slice sections and build extraction records.
//!
//! Each section carrying at least one canonical tag becomes an
//! [`Extraction`]: first canonical tag is the primary topic, the rest are
//! secondary. Sections that are already polish stubs are skipped so a
//! re-run never re-polishes its own output.

use std::fs;

use anyhow::{Context, Result};
use chrono::Utc;

use polish_core::digest::sha256_hex;
use polish_core::fsio::write_atomic;
use polish_ingest::scanner::{find_daily_logs, parse_log_date};
use polish_ingest::{detect_tags, parse_sections, Extraction};

use crate::phases::{lookback_range, PhaseContext};
use crate::state::RunState;

pub fn run(ctx: &PhaseContext, state: &mut RunState) -> Result<()> {
    ctx.console.phase(2, "extract sections");

    let range = lookback_range(ctx.today, ctx.config.advanced.lookback_days);
    let logs = find_daily_logs(&ctx.paths.memory_dir, Some(range))?;
    let topics_marker = format!("{}/", ctx.paths.topics_dir_name);

    state.extractions.clear();
    for rel in &logs {
        let text = fs::read_to_string(ctx.paths.memory_dir.join(rel))
            .with_context(|| format!("failed to read {rel}"))?;
        let file_name = rel.rsplit('/').next().unwrap_or(rel);
        let log_date = parse_log_date(file_name).unwrap_or(ctx.today);

        for section in parse_sections(&text, rel) {
            if is_polish_stub(&section.content, &topics_marker) {
                ctx.console
                    .detail(&format!("{rel}:{} already polished, skipping", section.line_start));
                continue;
            }

            let mut canonical_tags: Vec<String> = Vec::new();
            for tag in detect_tags(&section.content) {
                if let Some(canonical) = state.canonical_map.resolve(&tag) {
                    let canonical = canonical.to_string();
                    if !canonical_tags.contains(&canonical) {
                        canonical_tags.push(canonical);
                    }
                }
            }
            let Some((primary, secondary)) = canonical_tags.split_first() else {
                continue;
            };

            let extraction = Extraction {
                id: Extraction::make_id(log_date, section.index),
                source_file: rel.clone(),
                source_line_start: section.line_start,
                source_line_end: section.line_end,
                section_title: section.title.clone(),
                primary_topic: primary.clone(),
                secondary_topics: secondary.to_vec(),
                content_hash: sha256_hex(section.content.as_bytes()),
                full_content: section.content,
                extracted_at: Utc::now().to_rfc3339(),
            };

            if !ctx.dry_run {
                let path = ctx
                    .paths
                    .extractions_dir
                    .join(format!("{}.json", extraction.id));
                let json = serde_json::to_vec_pretty(&extraction)
                    .context("failed to serialize extraction")?;
                write_atomic(&path, &json)?;
            }
            ctx.console.detail(&format!(
                "{} — {} (#{})",
                extraction.id, extraction.section_title, extraction.primary_topic
            ));
            state.extractions.push(extraction);
        }
    }

    state.stats.extractions_created = state.extractions.len();
    ctx.console.done(&format!(
        "{} extractions from {} files",
        state.stats.extractions_created,
        logs.len()
    ));
    Ok(())
}

/// A section is a stub we previously wrote if it carries a polish pointer
/// and references the topics directory.
pub fn is_polish_stub(content: &str, topics_marker: &str) -> bool {
    (content.contains("→ **Polished to") || content.contains("→ **Primary:**"))
        && content.contains(topics_marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_detection_requires_pointer_and_topics_reference() {
        let stub = "## Trading\n→ **Polished to [Topics/Trading.md](Topics/Trading.md#2026-02-05)** on 2026-02-08";
        assert!(is_polish_stub(stub, "Topics/"));

        let multi = "## Mixed\n→ **Primary:** [Topics/Trading.md](Topics/Trading.md#2026-02-05) on 2026-02-08";
        assert!(is_polish_stub(multi, "Topics/"));

        // A pointer-looking line without the topics reference is content.
        assert!(!is_polish_stub("## X\n→ **Polished to somewhere else**", "Topics/"));
        // Ordinary sections never match.
        assert!(!is_polish_stub("## X\nnotes about Topics/ planning", "Topics/"));
    }
}
