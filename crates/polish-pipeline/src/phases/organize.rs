//! Phase 3: write topic files, cross-reference stubs, and apply merges.
//!
//! Appends are idempotent: an entry whose content hash already appears in
//! the topic file is skipped, so resuming or re-running this phase against
//! the same extractions leaves the files unchanged.

use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;

use polish_core::fsio::write_atomic;
use polish_ingest::Extraction;
use polish_similarity::MergeProposal;
use polish_storage::{TransactionEntry, TxStatus};

use crate::paths::topic_display_name;
use crate::phases::{entry_date, PhaseContext};
use crate::state::RunState;

pub fn run(ctx: &PhaseContext, state: &mut RunState) -> Result<()> {
    ctx.console.phase(3, "organize topic files");

    for i in 0..state.extractions.len() {
        let extraction = state.extractions[i].clone();
        write_entry(ctx, state, &extraction)?;
        for secondary in extraction.secondary_topics.clone() {
            write_cross_reference(ctx, state, &extraction, &secondary)?;
        }
    }

    let proposals = state.merge_proposals.clone();
    for proposal in &proposals {
        apply_merge(ctx, state, proposal)?;
    }

    ctx.console.done(&format!(
        "{} entries, {} cross-references, {} merges, {} new topic files",
        state.stats.entries_written,
        state.stats.cross_refs_created,
        state.stats.merges_completed,
        state.stats.topic_files_created
    ));
    Ok(())
}

fn write_entry(ctx: &PhaseContext, state: &mut RunState, extraction: &Extraction) -> Result<()> {
    let path = ctx.paths.topic_file_path(&extraction.primary_topic)?;
    let display = topic_display_name(&extraction.primary_topic);
    let date = entry_date(&extraction.id);

    let existing = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?
    } else {
        String::new()
    };

    if existing.contains(&extraction.content_hash) {
        ctx.console
            .detail(&format!("{}: entry {} already present", display, extraction.id));
        return Ok(());
    }

    let mut content = if existing.is_empty() {
        state.stats.topic_files_created += 1;
        topic_file_header(&display, &extraction.primary_topic, ctx)
    } else {
        existing
    };
    content.push_str(&entry_block(extraction, &date));
    write_atomic(&path, content.as_bytes())?;

    state.stats.entries_written += 1;
    ctx.console.detail(&format!("{display}: wrote entry {}", extraction.id));
    Ok(())
}

fn write_cross_reference(
    ctx: &PhaseContext,
    state: &mut RunState,
    extraction: &Extraction,
    secondary: &str,
) -> Result<()> {
    let path = ctx.paths.topic_file_path(secondary)?;
    let display = topic_display_name(secondary);
    let primary_display = topic_display_name(&extraction.primary_topic);
    let date = entry_date(&extraction.id);

    let existing = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let full_entry_link =
        format!("[Topics/{primary_display}.md](../{primary_display}.md#{date})");
    let healed_link = format!("[Topics/{primary_display}.md]({primary_display}.md#{date})");
    if existing.contains(&full_entry_link) || existing.contains(&healed_link) {
        return Ok(());
    }

    let mut content = if existing.is_empty() {
        state.stats.topic_files_created += 1;
        topic_file_header(&display, secondary, ctx)
    } else {
        existing
    };
    content.push_str(&cross_ref_block(extraction, &date, &full_entry_link));
    write_atomic(&path, content.as_bytes())?;

    state.stats.cross_refs_created += 1;
    ctx.console
        .detail(&format!("{display}: cross-reference to {primary_display} ({date})"));
    Ok(())
}

fn apply_merge(ctx: &PhaseContext, state: &mut RunState, proposal: &MergeProposal) -> Result<()> {
    let alias_path = ctx.paths.topic_file_path(&proposal.alias)?;
    if !alias_path.exists() {
        return Ok(());
    }
    let canonical_path = ctx.paths.topic_file_path(&proposal.canonical)?;
    if alias_path == canonical_path {
        return Ok(()); // sanitization collapsed both names onto one file
    }

    let alias_display = topic_display_name(&proposal.alias);
    let canonical_display = topic_display_name(&proposal.canonical);

    let alias_content = fs::read_to_string(&alias_path)
        .with_context(|| format!("failed to read {}", alias_path.display()))?;
    let mut canonical_content = if canonical_path.exists() {
        fs::read_to_string(&canonical_path)
            .with_context(|| format!("failed to read {}", canonical_path.display()))?
    } else {
        state.stats.topic_files_created += 1;
        topic_file_header(&canonical_display, &proposal.canonical, ctx)
    };

    let known_hashes = collect_hashes(&canonical_content);
    let alias_tag_re = Regex::new(&format!(r"#{}\b", regex::escape(&proposal.alias)))
        .context("failed to build alias rewrite pattern")?;

    let mut carried = 0usize;
    for block in entry_blocks(&alias_content) {
        let is_new = match block_hash(&block) {
            Some(hash) => !known_hashes.contains(&hash),
            None => !canonical_content.contains(block.trim()),
        };
        if !is_new {
            continue;
        }
        let rewritten = alias_tag_re
            .replace_all(&block, format!("#{}", proposal.canonical).as_str())
            .to_string();
        canonical_content.push('\n');
        canonical_content.push_str(rewritten.trim());
        canonical_content.push_str("\n\n---\n");
        carried += 1;
    }
    write_atomic(&canonical_path, canonical_content.as_bytes())?;

    // Move the alias file aside with a banner recording the merge.
    let archived_path = ctx
        .paths
        .topics_archive_dir
        .join(format!("{alias_display}_merged_{}.md", ctx.today));
    let banner = format!(
        "> Merged into [{canonical_display}.md](../{canonical_display}.md) on {} — method {}, confidence {:.2}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        proposal.method,
        proposal.confidence
    );
    write_atomic(&archived_path, format!("{banner}{alias_content}").as_bytes())?;
    fs::remove_file(&alias_path)
        .with_context(|| format!("failed to remove {}", alias_path.display()))?;

    ctx.txlog.append(
        &TransactionEntry::new("3", "merge_topic_file", TxStatus::Success)
            .with_source(format!("{alias_display}.md"))
            .with_destination(archived_path.to_string_lossy().to_string())
            .with_message(format!("{carried} entries carried into {canonical_display}.md")),
    )?;
    state.stats.merges_completed += 1;
    ctx.console.detail(&format!(
        "merged {alias_display}.md into {canonical_display}.md ({carried} entries carried)"
    ));
    Ok(())
}

fn topic_file_header(display: &str, canonical_tag: &str, ctx: &PhaseContext) -> String {
    format!(
        "# {display}\n\n> Curated entries extracted from daily logs. Newest entries append at the bottom.\n\n**Topic:** #{canonical_tag}\n**Polished:** {}\n\n---\n",
        ctx.today
    )
}

fn entry_block(extraction: &Extraction, date: &str) -> String {
    let src = &extraction.source_file;
    let mut topics_line = format!("**Topics:** #{}", extraction.primary_topic);
    for tag in &extraction.secondary_topics {
        topics_line.push_str(&format!(" #{tag}"));
    }
    format!(
        "\n### {date} — [{src}](../{src}#L{start})\n\n{content}\n\n{topics_line}\n**Source:** {src} (lines {start}-{end})\n**Hash:** {hash}\n\n---\n",
        start = extraction.source_line_start,
        end = extraction.source_line_end,
        content = extraction.full_content,
        hash = extraction.content_hash,
    )
}

fn cross_ref_block(extraction: &Extraction, date: &str, full_entry_link: &str) -> String {
    let preview: String = extraction
        .full_content
        .replace('\n', " ")
        .chars()
        .take(100)
        .collect();
    let mut tags_line = format!("**Tags:** #{}", extraction.primary_topic);
    for tag in &extraction.secondary_topics {
        tags_line.push_str(&format!(" #{tag}"));
    }
    format!(
        "\n### {date} — Cross-Reference\n\n📌 **Full entry:** {full_entry_link}\n\n**Preview:** {preview}...\n\n{tags_line}\n**Related File:** {src}\n\n---\n",
        src = extraction.source_file,
    )
}

/// Split a topic file on `\n---\n` and keep only the entry-shaped blocks
/// (headed by `### `), dropping the file header and quote banners.
fn entry_blocks(content: &str) -> Vec<String> {
    content
        .split("\n---\n")
        .map(|block| block.trim().to_string())
        .filter(|block| !block.is_empty() && !block.starts_with('>'))
        .filter(|block| block.starts_with("### ") || block.contains("\n### "))
        .collect()
}

fn block_hash(block: &str) -> Option<String> {
    block
        .lines()
        .find_map(|line| line.strip_prefix("**Hash:** "))
        .map(|hash| hash.trim().to_string())
}

fn collect_hashes(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix("**Hash:** "))
        .map(|hash| hash.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_extraction() -> Extraction {
        Extraction {
            id: "20260205-01".to_string(),
            source_file: "memory-2026-02-05.md".to_string(),
            source_line_start: 7,
            source_line_end: 9,
            section_title: "Trading Analysis".to_string(),
            primary_topic: "trading".to_string(),
            secondary_topics: vec!["python".to_string()],
            full_content: "## Trading Analysis\n#trading #python\nbacktest notes".to_string(),
            content_hash: "f".repeat(64),
            extracted_at: "2026-02-05T09:00:00Z".to_string(),
        }
    }

    #[test]
    fn entry_block_carries_source_link_topics_and_hash() {
        let e = sample_extraction();
        let block = entry_block(&e, "2026-02-05");

        assert!(block.contains(
            "### 2026-02-05 — [memory-2026-02-05.md](../memory-2026-02-05.md#L7)"
        ));
        assert!(block.contains("**Topics:** #trading #python"));
        assert!(block.contains("**Source:** memory-2026-02-05.md (lines 7-9)"));
        assert!(block.contains(&format!("**Hash:** {}", "f".repeat(64))));
        assert!(block.trim_end().ends_with("---"));
    }

    #[test]
    fn cross_ref_block_previews_and_links_the_primary() {
        let e = sample_extraction();
        let link = "[Topics/Trading.md](../Trading.md#2026-02-05)";
        let block = cross_ref_block(&e, "2026-02-05", link);

        assert!(block.contains("### 2026-02-05 — Cross-Reference"));
        assert!(block.contains("📌 **Full entry:** [Topics/Trading.md](../Trading.md#2026-02-05)"));
        assert!(block.contains("**Preview:** ## Trading Analysis #trading #python backtest notes..."));
        assert!(block.contains("**Tags:** #trading #python"));
        assert!(block.contains("**Related File:** memory-2026-02-05.md"));
    }

    #[test]
    fn entry_blocks_skip_header_and_quote_banners() {
        let content = "# Trading\n\n> Curated entries.\n\n**Topic:** #trading\n**Polished:** 2026-02-05\n\n---\n\n### 2026-02-05 — entry one\n\nbody\n\n**Hash:** abc\n\n---\n\n### 2026-02-06 — Cross-Reference\n\nstub body\n\n---\n";
        let blocks = entry_blocks(content);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("### 2026-02-05"));
        assert!(blocks[1].starts_with("### 2026-02-06"));
    }

    #[test]
    fn block_hash_reads_the_embedded_hash_line() {
        assert_eq!(
            block_hash("### x\n\nbody\n\n**Hash:** abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(block_hash("### x\n\nstub without hash"), None);
    }
}
