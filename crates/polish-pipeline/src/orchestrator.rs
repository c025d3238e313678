//! Pipeline orchestration.
//!
//! Wires phase 6 (resume gate) in front of phases 0–5, persists the
//! checkpoint at every phase boundary, and owns the two failure paths:
//!
//! - a phase error → best-effort rollback, rollback report, error re-raised
//!   (non-zero exit); the checkpoint stays so a transient failure can be
//!   resumed,
//! - validation errors → rollback, rollback report, checkpoint and
//!   transaction log archived, and a *successful* return carrying the
//!   errors (a clean rollback is a handled outcome, not a crash).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use chrono::Local;

use polish_similarity::{EmbeddingCache, EmbeddingProvider};
use polish_storage::{BackupStore, CheckpointStore, RunStats, TransactionLog};

use crate::config::PolishConfig;
use crate::console::Console;
use crate::paths::WorkspacePaths;
use crate::phases::resume::ResumeDecision;
use crate::phases::validate::ValidationOutcome;
use crate::phases::{self, PhaseContext};
use crate::rollback;
use crate::report;
use crate::state::RunState;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub no_resume: bool,
    pub force_from_phase: Option<u32>,
    pub verbose: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub session_id: String,
    pub rolled_back: bool,
    pub validation_errors: Vec<String>,
    pub report_path: Option<PathBuf>,
    pub stats: RunStats,
}

pub fn run_pipeline(
    root: &Path,
    config: &PolishConfig,
    options: &RunOptions,
    provider: Option<&dyn EmbeddingProvider>,
) -> Result<RunOutcome> {
    config.validate()?;
    let console = Console::new(options.verbose || config.logging.verbose);
    let paths = WorkspacePaths::resolve(root, config);

    if !paths.memory_dir.is_dir() {
        return Err(anyhow!(
            "memory directory not found at {} — nothing to polish",
            paths.memory_dir.display()
        ));
    }
    let canonical_root = paths
        .root
        .canonicalize()
        .unwrap_or_else(|_| paths.root.clone());

    let backups = BackupStore::new(&paths.backups_dir);
    let txlog = TransactionLog::new(&paths.txlog_path);
    let checkpoints = CheckpointStore::new(
        &paths.cache_dir,
        &config.recovery.checkpoint_file,
        &canonical_root,
    );

    let cache = provider.map(|p| EmbeddingCache::new(&paths.embeddings_db_path(), &p.model_version()));
    let embeddings = match (&cache, provider) {
        (Some(cache), Some(provider)) => Some((cache, provider)),
        _ => None,
    };

    let ctx = PhaseContext {
        config,
        paths: &paths,
        backups: &backups,
        txlog: &txlog,
        console: &console,
        today: Local::now().date_naive(),
        dry_run: options.dry_run,
        embeddings,
    };

    if options.dry_run {
        return run_dry(&ctx, &canonical_root);
    }

    // Phase 6 decides resume-vs-fresh before anything touches the tree.
    let decision = phases::resume::run(
        &checkpoints,
        &console,
        config.recovery.enable_checkpoints,
        options.no_resume,
        options.force_from_phase,
    )?;
    let (mut state, mut completed) = match decision {
        ResumeDecision::Fresh => (RunState::fresh(&canonical_root), Vec::new()),
        ResumeDecision::Resume(checkpoint) => RunState::from_checkpoint(*checkpoint),
    };
    paths.ensure_generated_dirs()?;

    match run_phases(&ctx, &checkpoints, &mut state, &mut completed, config) {
        Ok(outcome) if outcome.errors.is_empty() => {
            finalize(&ctx, &checkpoints, &txlog, &mut state, &completed, &outcome)
        }
        Ok(outcome) => {
            console.warn("validation failed; rolling back");
            let summary = rollback::run(&paths, &backups, &txlog, &console)?;
            let report_path =
                report::write_rollback_report(&paths, &state, ctx.today, &outcome.errors, &summary)?;
            // The run is over either way; park its audit state.
            checkpoints.archive()?;
            txlog.archive()?;
            console.done(&format!(
                "rolled back {} files; report at {}",
                summary.restored.len(),
                report_path.display()
            ));
            Ok(RunOutcome {
                session_id: state.session_id,
                rolled_back: true,
                validation_errors: outcome.errors,
                report_path: Some(report_path),
                stats: state.stats,
            })
        }
        Err(error) => {
            console.error(&format!("phase failed: {error:#}"));
            console.warn("rolling back daily-log modifications");
            match rollback::run(&paths, &backups, &txlog, &console) {
                Ok(summary) => {
                    let _ = report::write_rollback_report(
                        &paths,
                        &state,
                        ctx.today,
                        &[error.to_string()],
                        &summary,
                    );
                }
                Err(rollback_error) => {
                    console.error(&format!("rollback itself failed: {rollback_error:#}"));
                }
            }
            Err(error)
        }
    }
}

fn run_phases(
    ctx: &PhaseContext,
    checkpoints: &CheckpointStore,
    state: &mut RunState,
    completed: &mut Vec<u32>,
    config: &PolishConfig,
) -> Result<ValidationOutcome> {
    let mut validation = ValidationOutcome::default();

    for phase_id in 0u32..=5 {
        if completed.contains(&phase_id) {
            ctx.console
                .detail(&format!("phase {phase_id} already completed; skipping"));
            continue;
        }
        match phase_id {
            0 => phases::init::run(ctx, state)?,
            1 => phases::discover::run(ctx, state)?,
            2 => phases::extract::run(ctx, state)?,
            3 => phases::organize::run(ctx, state)?,
            4 => phases::update::run(ctx, state)?,
            5 => validation = phases::validate::run(ctx, state)?,
            _ => unreachable!("phase ids are 0-5"),
        }
        completed.push(phase_id);
        if config.recovery.enable_checkpoints {
            checkpoints.save(&state.to_checkpoint(phase_id, completed, "running"))?;
        }
    }
    Ok(validation)
}

fn finalize(
    ctx: &PhaseContext,
    checkpoints: &CheckpointStore,
    txlog: &TransactionLog,
    state: &mut RunState,
    completed: &[u32],
    outcome: &ValidationOutcome,
) -> Result<RunOutcome> {
    state.warnings.extend(outcome.warnings.iter().cloned());

    let (cleaned_backups, cleaned_extractions) = if ctx.config.cleanup.auto_cleanup {
        let keep_hours = ctx.config.cleanup.keep_session_cache_hours;
        let backups_cleaned = ctx.backups.clean_old(keep_hours)?;
        let extractions_cleaned = clean_old_extractions(&ctx.paths.extractions_dir, keep_hours)?;
        state.stats.backups_cleaned = backups_cleaned;
        state.stats.extractions_cleaned = extractions_cleaned;
        (backups_cleaned, extractions_cleaned)
    } else {
        (0, 0)
    };

    let report_path = report::write_session_report(
        ctx.paths,
        state,
        ctx.today,
        cleaned_backups,
        cleaned_extractions,
    )?;

    if ctx.config.recovery.enable_checkpoints {
        checkpoints.save(&state.to_checkpoint(6, completed, "completed"))?;
        checkpoints.archive()?;
    }
    txlog.archive()?;

    ctx.console.done(&format!(
        "session {} complete — report at {}",
        state.session_id,
        report_path.display()
    ));
    Ok(RunOutcome {
        session_id: state.session_id.clone(),
        rolled_back: false,
        validation_errors: Vec::new(),
        report_path: Some(report_path),
        stats: state.stats.clone(),
    })
}

/// Delete extraction JSON files older than the cache TTL (hours).
fn clean_old_extractions(dir: &Path, keep_hours: u64) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(keep_hours.saturating_mul(3600)))
        .ok_or_else(|| anyhow!("cleanup age {keep_hours}h underflows the clock"))?;

    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.metadata()?.modified()? < cutoff {
            fs::remove_file(entry.path())
                .with_context(|| format!("failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Dry run: phases 0–2 with every write suppressed, then a preview.
fn run_dry(ctx: &PhaseContext, canonical_root: &Path) -> Result<RunOutcome> {
    let mut state = RunState::fresh(canonical_root);
    phases::init::run(ctx, &mut state)?;
    phases::discover::run(ctx, &mut state)?;
    phases::extract::run(ctx, &mut state)?;

    let console = ctx.console;
    console.info("");
    console.info("dry run — no changes were made");
    if state.discovered_topics.is_empty() {
        console.info("no topics met the frequency threshold");
    } else {
        console.info("topics:");
        for (tag, stats) in &state.discovered_topics {
            console.info(&format!("  #{tag} ({} occurrences)", stats.count));
        }
    }
    if !state.merge_proposals.is_empty() {
        console.info("proposed merges:");
        for proposal in &state.merge_proposals {
            console.info(&format!(
                "  #{} → #{} ({}, {:.2})",
                proposal.alias, proposal.canonical, proposal.method, proposal.confidence
            ));
        }
    }
    console.info(&format!(
        "{} sections would be extracted into {} topics",
        state.extractions.len(),
        state.canonical_map.canonical_count()
    ));

    Ok(RunOutcome {
        session_id: state.session_id,
        rolled_back: false,
        validation_errors: Vec::new(),
        report_path: None,
        stats: state.stats,
    })
}
