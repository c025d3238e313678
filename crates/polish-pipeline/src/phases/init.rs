//! Phase 0: preflight, directory layout, backups.
//!
//! After this phase, every dated log inside the lookback window has a
//! content-addressed backup whose hash equals the file's pre-run bytes.
//! Backup creation strictly precedes any modification of that file.

use std::fs;

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;

use polish_core::digest::sha256_hex;
use polish_ingest::scanner::{find_daily_logs, parse_log_date};
use polish_storage::{TransactionEntry, TxStatus};

use crate::phases::{lookback_range, PhaseContext};
use crate::state::RunState;

/// Advisory only: the run targets a few hundred MB of peak memory, so a
/// multi-hundred-MB memory directory is worth flagging before we start.
const MEMORY_SIZE_WARN_BYTES: u64 = 400 * 1024 * 1024;

pub fn run(ctx: &PhaseContext, state: &mut RunState) -> Result<()> {
    ctx.console.phase(0, "initialize and back up");

    if !ctx.paths.memory_dir.is_dir() {
        return Err(anyhow!(
            "memory directory not found at {} — run from a workspace containing memory/",
            ctx.paths.memory_dir.display()
        ));
    }
    if !ctx.dry_run {
        ctx.paths.ensure_generated_dirs()?;
    }

    let total_bytes = total_size(&ctx.paths.memory_dir);
    if total_bytes > MEMORY_SIZE_WARN_BYTES {
        let warning = format!(
            "memory directory holds {} MB; this run may need more memory than expected",
            total_bytes / (1024 * 1024)
        );
        ctx.console.warn(&warning);
        state.warnings.push(warning);
    }

    let range = lookback_range(ctx.today, ctx.config.advanced.lookback_days);
    let logs = find_daily_logs(&ctx.paths.memory_dir, Some(range))?;

    for rel in &logs {
        let file_name = rel.rsplit('/').next().unwrap_or(rel);
        if parse_log_date(file_name).is_none() {
            continue; // only dated logs are candidates for modification
        }
        let path = ctx.paths.memory_dir.join(rel);
        let bytes = fs::read(&path).with_context(|| format!("failed to read {rel}"))?;
        let hash = sha256_hex(&bytes);

        if ctx.dry_run {
            ctx.console.detail(&format!("would back up {rel} ({hash})"));
            continue;
        }

        match ctx.backups.create(&bytes, Some(&hash)) {
            Ok(_) => {
                ctx.txlog.append(
                    &TransactionEntry::new("0", "backup", TxStatus::Success)
                        .with_target(rel.clone())
                        .with_hash(hash.clone()),
                )?;
                ctx.console.detail(&format!("backed up {rel}"));
                state.stats.backups_created += 1;
                state.stats.backup_bytes += bytes.len() as u64;
            }
            Err(e) => {
                ctx.txlog.append(
                    &TransactionEntry::new("0", "backup", TxStatus::Failed)
                        .with_target(rel.clone())
                        .with_message(e.to_string()),
                )?;
                return Err(e.context(format!("failed to back up {rel}")));
            }
        }
    }

    ctx.console.done(&format!(
        "session {} — {} backups, {} bytes",
        state.session_id, state.stats.backups_created, state.stats.backup_bytes
    ));
    Ok(())
}

fn total_size(dir: &std::path::Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
