//! Per-run markdown reports.
//!
//! One session report per successful run, one rollback report per failed
//! one, both under `.polish-reports/` and written atomically.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use polish_core::fsio::write_atomic;

use crate::paths::WorkspacePaths;
use crate::rollback::RollbackSummary;
use crate::state::RunState;

pub fn write_session_report(
    paths: &WorkspacePaths,
    state: &RunState,
    today: NaiveDate,
    cleaned_backups: usize,
    cleaned_extractions: usize,
) -> Result<PathBuf> {
    let path = paths
        .reports_dir
        .join(format!("polish-report-{today}-{}.md", state.session_id));

    let duration = DateTime::parse_from_rfc3339(&state.started_at)
        .map(|started| (Utc::now() - started.with_timezone(&Utc)).num_seconds())
        .unwrap_or(0);

    let mut report = String::new();
    report.push_str(&format!("# Polish session {}\n\n", state.session_id));
    report.push_str(&format!("- **Date:** {today}\n"));
    report.push_str(&format!("- **Started:** {}\n", state.started_at));
    report.push_str(&format!("- **Duration:** {duration}s\n"));
    report.push_str(&format!("- **Similarity method:** {}\n\n", state.similarity_method));

    let stats = &state.stats;
    report.push_str("## Counts\n\n");
    report.push_str("| Metric | Value |\n|---|---|\n");
    for (label, value) in [
        ("Files scanned", stats.files_scanned),
        ("Tags discovered", stats.tags_discovered),
        ("Merge proposals", stats.merge_proposals),
        ("Extractions", stats.extractions_created),
        ("Entries written", stats.entries_written),
        ("Cross-references", stats.cross_refs_created),
        ("Topic files created", stats.topic_files_created),
        ("Merges completed", stats.merges_completed),
        ("Daily logs updated", stats.files_updated),
        ("Daily logs archived", stats.files_archived),
        ("Files healed", stats.links_healed),
        ("Backups created", stats.backups_created),
    ] {
        report.push_str(&format!("| {label} | {value} |\n"));
    }
    report.push('\n');

    if !state.discovered_topics.is_empty() {
        report.push_str("## Topics\n\n| Tag | Count |\n|---|---|\n");
        let mut topics: Vec<_> = state.discovered_topics.iter().collect();
        topics.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        for (tag, tag_stats) in topics {
            report.push_str(&format!("| #{tag} | {} |\n", tag_stats.count));
        }
        report.push('\n');
    }

    if !state.merge_proposals.is_empty() {
        report.push_str("## Merges\n\n| Alias | Canonical | Method | Confidence |\n|---|---|---|---|\n");
        for proposal in &state.merge_proposals {
            report.push_str(&format!(
                "| #{} | #{} | {} | {:.2} |\n",
                proposal.alias, proposal.canonical, proposal.method, proposal.confidence
            ));
        }
        report.push('\n');
    }

    if cleaned_backups > 0 || cleaned_extractions > 0 {
        report.push_str(&format!(
            "## Cleanup\n\nRemoved {cleaned_backups} expired backups and {cleaned_extractions} expired extraction records.\n\n"
        ));
    }

    if state.warnings.is_empty() {
        report.push_str("## Warnings\n\nNone.\n");
    } else {
        report.push_str("## Warnings\n\n");
        for warning in &state.warnings {
            report.push_str(&format!("- {warning}\n"));
        }
    }

    write_atomic(&path, report.as_bytes())?;
    Ok(path)
}

pub fn write_rollback_report(
    paths: &WorkspacePaths,
    state: &RunState,
    today: NaiveDate,
    errors: &[String],
    summary: &RollbackSummary,
) -> Result<PathBuf> {
    let path = paths.reports_dir.join(format!("rollback-{today}.md"));

    let mut report = String::new();
    report.push_str(&format!("# Rollback — session {}\n\n", state.session_id));
    report.push_str(&format!("- **Date:** {today}\n"));
    report.push_str(&format!("- **Session started:** {}\n\n", state.started_at));

    report.push_str("## Why\n\n");
    if errors.is_empty() {
        report.push_str("A phase failed before completion; see the error above the rollback.\n\n");
    } else {
        for error in errors {
            report.push_str(&format!("- {error}\n"));
        }
        report.push('\n');
    }

    report.push_str("## Restored\n\n");
    if summary.restored.is_empty() {
        report.push_str("No daily logs required restoration.\n\n");
    } else {
        for file in &summary.restored {
            report.push_str(&format!("- {file}\n"));
        }
        report.push('\n');
    }

    if summary.skipped > 0 {
        report.push_str(&format!(
            "{} transaction entries were skipped (missing hash or target).\n\n",
            summary.skipped
        ));
    }
    if !summary.failed.is_empty() {
        report.push_str("## Restore failures\n\n");
        for failure in &summary.failed {
            report.push_str(&format!("- {failure}\n"));
        }
        report.push('\n');
    }

    report.push_str(
        "Topic files written during the aborted run were left in place; daily-log stub replacements were undone.\n",
    );

    write_atomic(&path, report.as_bytes())?;
    Ok(path)
}
