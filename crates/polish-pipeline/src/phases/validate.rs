//! Phase 5: integrity checks.
//!
//! Four checks, errors and warnings collected separately:
//!
//! 1. content integrity: every extraction's hash appears in its primary
//!    topic file,
//! 2. link integrity: every intra-workspace link in a topic file resolves,
//! 3. merge integrity: merges left archives behind and no topic file
//!    carries duplicate hashes,
//! 4. filesystem health: non-empty, readable topic files free of
//!    serializer artifacts.
//!
//! The orchestrator rolls back when `errors` is non-empty.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::paths::topic_display_name;
use crate::phases::PhaseContext;
use crate::state::RunState;

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn run(ctx: &PhaseContext, state: &mut RunState) -> Result<ValidationOutcome> {
    ctx.console.phase(5, "validate");
    let mut outcome = ValidationOutcome::default();

    check_content_integrity(ctx, state, &mut outcome);
    check_link_integrity(ctx, &mut outcome)?;
    check_merge_integrity(ctx, state, &mut outcome)?;
    check_filesystem_health(ctx, &mut outcome)?;

    for warning in &outcome.warnings {
        ctx.console.warn(warning);
    }
    if outcome.errors.is_empty() {
        ctx.console.done(&format!(
            "all checks passed ({} warnings)",
            outcome.warnings.len()
        ));
    } else {
        for error in &outcome.errors {
            ctx.console.error(error);
        }
    }
    Ok(outcome)
}

fn check_content_integrity(ctx: &PhaseContext, state: &RunState, outcome: &mut ValidationOutcome) {
    for extraction in &state.extractions {
        let path = match ctx.paths.topic_file_path(&extraction.primary_topic) {
            Ok(p) => p,
            Err(e) => {
                outcome.errors.push(format!("missing_entry: {} — {e}", extraction.id));
                continue;
            }
        };
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => {
                outcome.errors.push(format!(
                    "missing_entry: topic file {} absent for extraction {}",
                    path.display(),
                    extraction.id
                ));
                continue;
            }
        };
        if !content.contains(&extraction.content_hash) {
            outcome.errors.push(format!(
                "missing_entry: {} not found in {} (extraction {})",
                extraction.content_hash,
                path.display(),
                extraction.id
            ));
        }
    }
}

fn check_link_integrity(ctx: &PhaseContext, outcome: &mut ValidationOutcome) -> Result<()> {
    if !ctx.paths.topics_dir.is_dir() {
        return Ok(());
    }
    let link_re = Regex::new(r"\[[^\]]*\]\(([^)]+)\)").expect("static regex");

    for (name, content) in topic_files(&ctx.paths.topics_dir)? {
        for caps in link_re.captures_iter(&content) {
            let target = caps[1].trim();
            if target.starts_with("http://")
                || target.starts_with("https://")
                || target.starts_with("mailto:")
                || target.starts_with('#')
            {
                continue;
            }
            let path_part = target.split('#').next().unwrap_or(target);
            if path_part.is_empty() {
                continue;
            }
            let resolved = lexical_resolve(&ctx.paths.topics_dir, path_part);
            if !resolved.exists() {
                outcome
                    .errors
                    .push(format!("broken_link: {name} → {target}"));
            }
        }
    }
    Ok(())
}

fn check_merge_integrity(
    ctx: &PhaseContext,
    state: &RunState,
    outcome: &mut ValidationOutcome,
) -> Result<()> {
    for proposal in &state.merge_proposals {
        let alias_display = topic_display_name(&proposal.alias);
        let prefix = format!("{alias_display}_merged_");
        let mut found = false;
        if ctx.paths.topics_archive_dir.is_dir() {
            for entry in fs::read_dir(&ctx.paths.topics_archive_dir)? {
                let entry = entry?;
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&prefix)
                {
                    found = true;
                    break;
                }
            }
        }
        if !found {
            outcome.warnings.push(format!(
                "no merge archive for alias '{}' (expected {prefix}<date>.md)",
                proposal.alias
            ));
        }

        // The canonical file must not have picked up duplicate entries.
        let canonical_path = match ctx.paths.topic_file_path(&proposal.canonical) {
            Ok(p) => p,
            Err(e) => {
                outcome.errors.push(e.to_string());
                continue;
            }
        };
        if let Ok(content) = fs::read_to_string(&canonical_path) {
            let mut seen = BTreeSet::new();
            for hash in content
                .lines()
                .filter_map(|line| line.strip_prefix("**Hash:** "))
            {
                if !seen.insert(hash.trim().to_string()) {
                    outcome.errors.push(format!(
                        "duplicate_hash: {} appears more than once in {}",
                        hash.trim(),
                        canonical_path.display()
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_filesystem_health(ctx: &PhaseContext, outcome: &mut ValidationOutcome) -> Result<()> {
    if !ctx.paths.topics_dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(&ctx.paths.topics_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".md") {
            continue;
        }
        let len = entry.metadata()?.len();
        if len == 0 {
            outcome.errors.push(format!("empty_file: {name} is 0 bytes"));
            continue;
        }
        if len < 100 {
            outcome
                .warnings
                .push(format!("thin_file: {name} is only {len} bytes"));
        }
        let content = match fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(e) => {
                outcome.errors.push(format!("unreadable_file: {name} — {e}"));
                continue;
            }
        };
        for artifact in ["undefined", "[object Object]"] {
            if content.contains(artifact) {
                outcome.errors.push(format!(
                    "serializer_artifact: {name} contains {artifact:?}"
                ));
            }
        }
    }
    Ok(())
}

fn topic_files(dir: &Path) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".md") {
            continue;
        }
        let content = fs::read_to_string(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        out.push((name, content));
    }
    out.sort();
    Ok(out)
}

/// Resolve `rel` against `base` lexically (no symlink traversal), so
/// `../memory-x.md` and `Archive/2026/x.md` both land where the link says.
fn lexical_resolve(base: &Path, rel: &str) -> PathBuf {
    let mut resolved = base.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_resolve_handles_parent_and_nested_targets() {
        let base = Path::new("/w/memory/Topics");
        assert_eq!(
            lexical_resolve(base, "../memory-2026-02-05.md"),
            PathBuf::from("/w/memory/memory-2026-02-05.md")
        );
        assert_eq!(
            lexical_resolve(base, "Trading.md"),
            PathBuf::from("/w/memory/Topics/Trading.md")
        );
        assert_eq!(
            lexical_resolve(base, "../Archive/2026/memory-2026-01-01.md"),
            PathBuf::from("/w/memory/Archive/2026/memory-2026-01-01.md")
        );
    }
}
