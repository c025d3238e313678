//! The `polish` binary: curate dated daily logs into per-topic markdown files.
//!
//! The CLI owns everything the pipeline treats as external: argument
//! parsing, workspace discovery, config-file loading and overrides, and
//! exit codes. A clean rollback after validation failure exits 0 (the
//! outcome is reported in `rollback-<date>.md`); only I/O, security and
//! unrecoverable-rollback errors exit non-zero.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;

use polish_pipeline::config::PolishConfig;
use polish_pipeline::orchestrator::{run_pipeline, RunOptions};
use polish_pipeline::paths::WorkspacePaths;
use polish_similarity::{EmbeddingProvider, OllamaProvider, SimilarityMethod};
use polish_storage::CheckpointStore;

/// Config file looked up in the workspace root.
const CONFIG_FILE_NAME: &str = "polish.config.json";

/// How many parent directories to probe when discovering the workspace.
const DISCOVERY_DEPTH: usize = 6;

#[derive(Parser)]
#[command(name = "polish")]
#[command(version, about = "Curate dated daily logs into per-topic markdown files")]
struct Cli {
    /// Run discovery and extraction only; print a preview, change nothing.
    #[arg(long)]
    dry_run: bool,

    /// Override `archive.enabled` from the config.
    #[arg(long, value_name = "BOOL")]
    archive: Option<bool>,

    /// Print per-file and per-proposal detail.
    #[arg(long, short)]
    verbose: bool,

    /// Override `advanced.lookback_days`.
    #[arg(long, value_name = "N")]
    lookback_days: Option<i64>,

    /// Ignore an incomplete checkpoint and start fresh.
    #[arg(long)]
    no_resume: bool,

    /// Delete any stored checkpoint and exit.
    #[arg(long)]
    clear_checkpoint: bool,

    /// Re-run from the given phase id (0-5), overriding the checkpoint.
    #[arg(long, value_name = "N")]
    force_from_phase: Option<u32>,

    /// Workspace root (skips discovery).
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Config file path (default: `<workspace>/polish.config.json`).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let root = match &cli.workspace {
        Some(path) => path.clone(),
        None => discover_workspace()?,
    };

    let mut config = load_config(&root, cli.config.as_deref())?;
    if let Some(enabled) = cli.archive {
        config.archive.enabled = enabled;
    }
    if let Some(days) = cli.lookback_days {
        config.advanced.lookback_days = days;
    }
    if cli.verbose {
        config.logging.verbose = true;
    }
    config.validate()?;

    if cli.clear_checkpoint {
        return clear_checkpoint(&root, &config);
    }

    let provider = build_provider(&config);
    let options = RunOptions {
        dry_run: cli.dry_run,
        no_resume: cli.no_resume,
        force_from_phase: cli.force_from_phase,
        verbose: cli.verbose,
    };

    let outcome = run_pipeline(
        &root,
        &config,
        &options,
        provider.as_ref().map(|p| p as &dyn EmbeddingProvider),
    )?;

    if outcome.rolled_back {
        eprintln!(
            "{} validation failed; workspace restored ({} errors, see report)",
            "notice:".yellow().bold(),
            outcome.validation_errors.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Build the embedding capability: only when the effective method wants
/// embeddings; a missing backend just means mechanical similarity.
fn build_provider(config: &PolishConfig) -> Option<OllamaProvider> {
    if config.effective_method() != SimilarityMethod::Embedding {
        return None;
    }
    Some(OllamaProvider::new(&config.topic_similarity.model))
}

fn clear_checkpoint(root: &Path, config: &PolishConfig) -> Result<ExitCode> {
    let paths = WorkspacePaths::resolve(root, config);
    let canonical_root = paths
        .root
        .canonicalize()
        .unwrap_or_else(|_| paths.root.clone());
    let store = CheckpointStore::new(
        &paths.cache_dir,
        &config.recovery.checkpoint_file,
        &canonical_root,
    );
    if store.exists() {
        store.delete()?;
        println!("checkpoint cleared");
    } else {
        println!("no checkpoint to clear");
    }
    Ok(ExitCode::SUCCESS)
}

/// Locate the workspace root: env hints first, then walk up from the
/// current directory looking for `AGENTS.md` + `memory/` markers.
fn discover_workspace() -> Result<PathBuf> {
    for var in ["MEMORY_DIR", "OPENCLAW_WORKSPACE"] {
        if let Ok(value) = env::var(var) {
            if value.is_empty() {
                continue;
            }
            let hinted = PathBuf::from(value);
            if let Some(root) = workspace_from_hint(&hinted) {
                return Ok(root);
            }
            return Err(anyhow!(
                "{var}={} does not point at a workspace containing memory/",
                hinted.display()
            ));
        }
    }

    let cwd = env::current_dir().context("cannot determine current directory")?;
    let mut candidate = cwd.as_path();
    for _ in 0..=DISCOVERY_DEPTH {
        if candidate.join("AGENTS.md").is_file() && candidate.join("memory").is_dir() {
            return Ok(candidate.to_path_buf());
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => break,
        }
    }
    Err(anyhow!(
        "no workspace found: set MEMORY_DIR/OPENCLAW_WORKSPACE, pass --workspace, \
         or run inside a directory tree containing AGENTS.md and memory/"
    ))
}

/// Accept either the workspace root or its `memory/` directory as a hint.
fn workspace_from_hint(hinted: &Path) -> Option<PathBuf> {
    if hinted.join("memory").is_dir() {
        return Some(hinted.to_path_buf());
    }
    if hinted.file_name().is_some_and(|name| name == "memory") && hinted.is_dir() {
        return hinted.parent().map(Path::to_path_buf);
    }
    None
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<PolishConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = root.join(CONFIG_FILE_NAME);
            if !default.is_file() {
                return Ok(PolishConfig::default());
            }
            default
        }
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hint_accepts_root_or_memory_directory() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("memory")).expect("mkdir");

        assert_eq!(workspace_from_hint(root), Some(root.to_path_buf()));
        assert_eq!(
            workspace_from_hint(&root.join("memory")),
            Some(root.to_path_buf())
        );
        assert_eq!(workspace_from_hint(&root.join("elsewhere")), None);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = load_config(dir.path(), None).expect("load");
        assert_eq!(config, PolishConfig::default());
    }

    #[test]
    fn config_file_overrides_are_loaded() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"advanced": {"lookback_days": 30}, "archive": {"enabled": false}}"#,
        )
        .expect("write");

        let config = load_config(dir.path(), None).expect("load");
        assert_eq!(config.advanced.lookback_days, 30);
        assert!(!config.archive.enabled);
    }

    #[test]
    fn malformed_config_is_a_preflight_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{"unknown_section": {}}"#).expect("write");
        assert!(load_config(dir.path(), Some(&path)).is_err());
    }
}
