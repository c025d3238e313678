//! Phase 4: replace extracted sections with stubs, archive old logs,
//! heal links.
//!
//! Replacements run bottom-up per file (strictly descending
//! `source_line_start`) so earlier splices never shift later spans. Every
//! modified file's pre-modification hash is recorded with the
//! `replace_stubs` transaction; that pair is what rollback replays.

use std::collections::BTreeMap;
use std::fs;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, Utc};
use regex::Regex;

use polish_core::digest::sha256_hex;
use polish_core::fsio::{move_safe, write_atomic};
use polish_ingest::scanner::parse_log_date;
use polish_ingest::Extraction;
use polish_storage::{TransactionEntry, TxStatus};

use crate::paths::topic_display_name;
use crate::phases::{entry_date, PhaseContext};
use crate::state::RunState;

/// A rebuilt file may legitimately get much smaller, but shrinking past
/// this fraction of the original means we mangled it.
const MIN_REBUILD_FRACTION: f64 = 0.05;

pub fn run(ctx: &PhaseContext, state: &mut RunState) -> Result<()> {
    ctx.console.phase(4, "update daily logs");

    let mut by_file: BTreeMap<String, Vec<Extraction>> = BTreeMap::new();
    for extraction in &state.extractions {
        by_file
            .entry(extraction.source_file.clone())
            .or_default()
            .push(extraction.clone());
    }

    for (rel, mut extractions) in by_file {
        replace_with_stubs(ctx, state, &rel, &mut extractions)?;
    }

    let archived = if ctx.config.archive.enabled {
        archive_old_logs(ctx, state)?
    } else {
        Vec::new()
    };

    heal_links(ctx, state, &archived)?;

    ctx.console.done(&format!(
        "{} files stubbed, {} archived, {} files healed",
        state.stats.files_updated, state.stats.files_archived, state.stats.links_healed
    ));
    Ok(())
}

fn replace_with_stubs(
    ctx: &PhaseContext,
    state: &mut RunState,
    rel: &str,
    extractions: &mut [Extraction],
) -> Result<()> {
    let path = ctx.paths.memory_dir.join(rel);
    let original = fs::read_to_string(&path).with_context(|| format!("failed to read {rel}"))?;
    let pre_hash = sha256_hex(original.as_bytes());
    // A backup must exist before this file changes; content addressing
    // makes this a no-op when phase 0 already stored it.
    ctx.backups.create(original.as_bytes(), Some(&pre_hash))?;

    let had_trailing_newline = original.ends_with('\n');
    let mut lines: Vec<String> = original.lines().map(String::from).collect();

    extractions.sort_by(|a, b| b.source_line_start.cmp(&a.source_line_start));
    for extraction in extractions.iter() {
        if extraction.source_line_start == 0
            || extraction.source_line_start > extraction.source_line_end
            || extraction.source_line_end > lines.len()
        {
            return Err(anyhow!(
                "extraction {} spans lines {}-{} but {rel} has {} lines",
                extraction.id,
                extraction.source_line_start,
                extraction.source_line_end,
                lines.len()
            ));
        }
        let stub = stub_lines(extraction, ctx);
        lines.splice(extraction.source_line_start - 1..extraction.source_line_end, stub);
    }

    let mut rebuilt = lines.join("\n");
    if had_trailing_newline {
        rebuilt.push('\n');
    }

    if rebuilt.trim().is_empty() {
        return Err(anyhow!("stub replacement emptied {rel}"));
    }
    if (rebuilt.len() as f64) < (original.len() as f64) * MIN_REBUILD_FRACTION {
        return Err(anyhow!(
            "stub replacement shrank {rel} from {} to {} bytes; refusing",
            original.len(),
            rebuilt.len()
        ));
    }

    write_atomic(&path, rebuilt.as_bytes())?;
    ctx.txlog.append(
        &TransactionEntry::new("4", "replace_stubs", TxStatus::Success)
            .with_target(rel.to_string())
            .with_hash(pre_hash),
    )?;
    state.stats.files_updated += 1;
    if !state.files_processed.contains(&rel.to_string()) {
        state.files_processed.push(rel.to_string());
    }
    ctx.console
        .detail(&format!("{rel}: {} sections replaced", extractions.len()));
    Ok(())
}

fn stub_lines(extraction: &Extraction, ctx: &PhaseContext) -> Vec<String> {
    let date = entry_date(&extraction.id);
    let primary = topic_display_name(&extraction.primary_topic);
    let topics = &ctx.paths.topics_dir_name;

    let mut lines = vec![format!("## {}", extraction.section_title)];
    if extraction.secondary_topics.is_empty() {
        lines.push(format!(
            "→ **Polished to [{topics}/{primary}.md]({topics}/{primary}.md#{date})** on {}",
            ctx.today
        ));
    } else {
        lines.push(format!(
            "→ **Primary:** [{topics}/{primary}.md]({topics}/{primary}.md#{date}) on {}",
            ctx.today
        ));
        let others: Vec<String> = extraction
            .secondary_topics
            .iter()
            .map(|topic| topic_display_name(topic))
            .collect();
        lines.push(format!("→ **Also in:** {}", others.join(", ")));
        let mut tags = format!("📎 Topics: #{}", extraction.primary_topic);
        for tag in &extraction.secondary_topics {
            tags.push_str(&format!(" #{tag}"));
        }
        lines.push(tags);
    }
    lines
}

/// Move dated logs older than the grace period into `Archive/<year>/`.
/// Only logs directly under `memory/` are archived.
fn archive_old_logs(ctx: &PhaseContext, state: &mut RunState) -> Result<Vec<(String, i32)>> {
    let cutoff = ctx.today - Duration::days(ctx.config.archive.grace_period_days);
    let mut archived = Vec::new();

    let entries = fs::read_dir(&ctx.paths.memory_dir)
        .with_context(|| format!("failed to list {}", ctx.paths.memory_dir.display()))?;
    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();

    for name in names {
        let Some(date) = parse_log_date(&name) else {
            continue;
        };
        if date >= cutoff {
            continue;
        }
        let year = date.year();
        let src = ctx.paths.memory_dir.join(&name);
        let year_dir = ctx.paths.archive_dir.join(year.to_string());
        let mut dst = year_dir.join(&name);

        if dst.exists() {
            let src_bytes = fs::read(&src)?;
            let dst_bytes = fs::read(&dst)?;
            if src_bytes == dst_bytes {
                fs::remove_file(&src)
                    .with_context(|| format!("failed to remove {}", src.display()))?;
                log_archive(ctx, &name, &dst)?;
                state.stats.files_archived += 1;
                archived.push((name, year));
                continue;
            }
            let stem = name.trim_end_matches(".md");
            dst = year_dir.join(format!("{stem}_conflict_{}.md", Utc::now().timestamp_millis()));
        }

        match move_safe(&src, &dst) {
            Ok(()) => {
                log_archive(ctx, &name, &dst)?;
                state.stats.files_archived += 1;
                ctx.console.detail(&format!("archived {name} → {}", dst.display()));
                archived.push((name, year));
            }
            Err(e) => {
                ctx.txlog.append(
                    &TransactionEntry::new("4", "archive", TxStatus::Failed)
                        .with_source(name.clone())
                        .with_message(e.to_string()),
                )?;
                return Err(e);
            }
        }
    }
    Ok(archived)
}

fn log_archive(ctx: &PhaseContext, name: &str, dst: &std::path::Path) -> Result<()> {
    ctx.txlog.append(
        &TransactionEntry::new("4", "archive", TxStatus::Success)
            .with_source(name.to_string())
            .with_destination(dst.to_string_lossy().to_string()),
    )
}

/// Repair links inside topic files.
///
/// - `](X#unknown)` → `](X)`
/// - `](Topics/Name.md…)` → `](Name.md…)` (a topic file linking through its
///   own directory)
/// - `](../Name.md…)` → `](Name.md…)` only when `Topics/Name.md` exists, so
///   relative links to daily logs survive
/// - links to logs archived this run are re-pointed at `Archive/<year>/`
fn heal_links(ctx: &PhaseContext, state: &mut RunState, archived: &[(String, i32)]) -> Result<()> {
    if !ctx.paths.topics_dir.is_dir() {
        return Ok(());
    }
    let unknown_re = Regex::new(r"\]\(([^)#]+)#unknown\)").expect("static regex");
    let legacy_re = Regex::new(&format!(
        r"\]\((?:\.\./|{}/)([^)/#]+\.md)(#[^)]*)?\)",
        regex::escape(&ctx.paths.topics_dir_name)
    ))
    .expect("static regex with escaped dir name");

    for entry in fs::read_dir(&ctx.paths.topics_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".md") {
            continue;
        }
        let path = entry.path();
        let original = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let mut healed = unknown_re.replace_all(&original, "]($1)").to_string();
        healed = legacy_re
            .replace_all(&healed, |caps: &regex::Captures| {
                let target = &caps[1];
                let anchor = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let whole = caps.get(0).expect("whole match").as_str();
                let via_topics_dir = !whole.starts_with("](../");
                if via_topics_dir || ctx.paths.topics_dir.join(target).exists() {
                    format!("]({target}{anchor})")
                } else {
                    whole.to_string()
                }
            })
            .to_string();

        for (log, year) in archived {
            let archive_dir = &ctx.paths.archive_dir_name;
            healed = healed.replace(
                &format!("](../{log})"),
                &format!("](../{archive_dir}/{year}/{log})"),
            );
            healed = healed.replace(
                &format!("](../{log}#"),
                &format!("](../{archive_dir}/{year}/{log}#"),
            );
        }

        if healed != original {
            write_atomic(&path, healed.as_bytes())?;
            state.stats.links_healed += 1;
            ctx.console.detail(&format!("healed links in {name}"));
        }
    }
    Ok(())
}
