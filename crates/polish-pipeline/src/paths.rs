//! Workspace layout and topic-path sanitation.
//!
//! Layout, relative to the workspace root `W`:
//!
//! ```text
//! W/memory/                       daily logs + freeform notes
//! W/memory/Topics/                generated topic files
//! W/memory/Topics/.archive/       merged-away alias topic files
//! W/memory/Archive/<year>/        archived daily logs
//! W/memory/.polish-cache/         backups/ extractions/ embeddings/
//!                                 checkpoint.json transaction.log
//! W/memory/.polish-reports/       per-run reports
//! ```
//!
//! Topic names come from user-authored hashtags, so the path they resolve
//! to is treated as hostile input: after sanitation the resolved absolute
//! path must be a strict descendant of the resolved topics directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::config::PolishConfig;

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub memory_dir: PathBuf,
    pub topics_dir: PathBuf,
    pub topics_archive_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub extractions_dir: PathBuf,
    pub embeddings_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub txlog_path: PathBuf,
    pub topics_dir_name: String,
    pub archive_dir_name: String,
}

impl WorkspacePaths {
    pub fn resolve(root: &Path, config: &PolishConfig) -> Self {
        let memory_dir = root.join("memory");
        let topics_dir = memory_dir.join(&config.advanced.topics_directory);
        let archive_dir = memory_dir.join(&config.advanced.archive_directory);
        let cache_dir = memory_dir.join(&config.advanced.cache_directory);
        let reports_dir = memory_dir.join(&config.logging.report_location);
        Self {
            root: root.to_path_buf(),
            topics_archive_dir: topics_dir.join(".archive"),
            backups_dir: cache_dir.join("backups"),
            extractions_dir: cache_dir.join("extractions"),
            embeddings_dir: cache_dir.join("embeddings"),
            txlog_path: cache_dir.join("transaction.log"),
            topics_dir_name: config.advanced.topics_directory.clone(),
            archive_dir_name: config.advanced.archive_directory.clone(),
            memory_dir,
            topics_dir,
            archive_dir,
            cache_dir,
            reports_dir,
        }
    }

    pub fn embeddings_db_path(&self) -> PathBuf {
        self.embeddings_dir.join("embeddings.db")
    }

    /// Create every generated directory. Idempotent.
    pub fn ensure_generated_dirs(&self) -> Result<()> {
        for dir in [
            &self.cache_dir,
            &self.backups_dir,
            &self.extractions_dir,
            &self.embeddings_dir,
            &self.reports_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Resolve the topic file for `topic`, enforcing containment in the
    /// topics directory. Creates the topics directory if needed.
    pub fn topic_file_path(&self, topic: &str) -> Result<PathBuf> {
        let file_name = format!("{}.md", topic_display_name(topic));

        fs::create_dir_all(&self.topics_dir)
            .with_context(|| format!("failed to create {}", self.topics_dir.display()))?;
        let canon_dir = self
            .topics_dir
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", self.topics_dir.display()))?;
        let candidate = canon_dir.join(&file_name);
        if candidate == canon_dir || !candidate.starts_with(&canon_dir) {
            return Err(anyhow!(
                "Security violation: topic {topic:?} resolves outside {}",
                canon_dir.display()
            ));
        }
        Ok(self.topics_dir.join(file_name))
    }
}

/// Strip traversal and filename-invalid characters, cap length, never
/// return an empty string.
pub fn sanitize_topic_name(topic: &str) -> String {
    let mut name = topic.replace("..", "");
    name.retain(|c| {
        !matches!(c, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*') && !c.is_control()
    });
    let name: String = name.chars().take(100).collect();
    let name = name.trim().to_string();
    if name.is_empty() {
        "unnamed".to_string()
    } else {
        name
    }
}

/// Sanitized topic name with the first letter capitalized: the display
/// form used for topic file names (`trading` → `Trading`).
pub fn topic_display_name(topic: &str) -> String {
    let name = sanitize_topic_name(topic);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => name,
    }
}
