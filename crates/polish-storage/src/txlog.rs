//! Append-only transaction log.
//!
//! One JSON object per line in `.polish-cache/transaction.log`. Appends are
//! serialized through a mutex so entries land in time order even if a phase
//! issues writes from helper threads; each `append` is an atomic commit
//! point (a crash between appends loses nothing already written).
//!
//! Rollback replays `get_reverse()`, restoring the recorded
//! pre-modification hashes from the backup store.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Failed,
}

/// One audit record. Optional fields are omitted from the serialized line
/// when unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionEntry {
    pub timestamp: String,
    pub phase: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: TxStatus,
}

impl TransactionEntry {
    pub fn new(phase: impl Into<String>, action: impl Into<String>, status: TxStatus) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            phase: phase.into(),
            action: action.into(),
            target: None,
            hash: None,
            source: None,
            destination: None,
            message: None,
            status,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub struct TransactionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TransactionLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line. Serialized across callers.
    pub fn append(&self, entry: &TransactionEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("failed to serialize transaction entry")?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("transaction log mutex poisoned"))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }

    /// Parse every line; a missing log reads as empty.
    pub fn read(&self) -> Result<Vec<TransactionEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let mut entries = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransactionEntry = serde_json::from_str(line).with_context(|| {
                format!("corrupt transaction entry at {}:{}", self.path.display(), i + 1)
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn get_by_action(&self, action: &str) -> Result<Vec<TransactionEntry>> {
        Ok(self.read()?.into_iter().filter(|e| e.action == action).collect())
    }

    pub fn get_failed(&self) -> Result<Vec<TransactionEntry>> {
        Ok(self
            .read()?
            .into_iter()
            .filter(|e| e.status == TxStatus::Failed)
            .collect())
    }

    /// Entries newest-first, for rollback traversal.
    pub fn get_reverse(&self) -> Result<Vec<TransactionEntry>> {
        let mut entries = self.read()?;
        entries.reverse();
        Ok(entries)
    }

    /// Rename the log to `transaction_<yyyymmddHHMMSS>.log` and truncate a
    /// fresh empty one. Returns the archive path, or `None` when there was
    /// nothing to archive.
    pub fn archive(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let archived = self.path.with_file_name(format!("transaction_{stamp}.log"));

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("transaction log mutex poisoned"))?;
        fs::rename(&self.path, &archived).with_context(|| {
            format!(
                "failed to archive {} to {}",
                self.path.display(),
                archived.display()
            )
        })?;
        fs::write(&self.path, b"")
            .with_context(|| format!("failed to truncate {}", self.path.display()))?;
        Ok(Some(archived))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn log_in(dir: &Path) -> TransactionLog {
        TransactionLog::new(&dir.join("transaction.log"))
    }

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = tempdir().expect("tempdir");
        let log = log_in(dir.path());

        log.append(
            &TransactionEntry::new("0", "backup", TxStatus::Success)
                .with_target("memory-2026-02-05.md")
                .with_hash("abc"),
        )
        .expect("append");
        log.append(&TransactionEntry::new("4", "replace_stubs", TxStatus::Failed))
            .expect("append");

        let raw = fs::read_to_string(log.path()).expect("read");
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<TransactionEntry>(line).expect("parseable line");
        }
    }

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let dir = tempdir().expect("tempdir");
        let log = log_in(dir.path());
        log.append(&TransactionEntry::new("0", "backup", TxStatus::Success))
            .expect("append");

        let raw = fs::read_to_string(log.path()).expect("read");
        assert!(!raw.contains("\"target\""));
        assert!(!raw.contains("\"hash\""));
        assert!(raw.contains("\"status\":\"success\""));
    }

    #[test]
    fn filters_by_action_and_status() {
        let dir = tempdir().expect("tempdir");
        let log = log_in(dir.path());
        log.append(&TransactionEntry::new("0", "backup", TxStatus::Success))
            .expect("append");
        log.append(&TransactionEntry::new("4", "replace_stubs", TxStatus::Success))
            .expect("append");
        log.append(&TransactionEntry::new("4", "archive", TxStatus::Failed))
            .expect("append");

        assert_eq!(log.get_by_action("backup").expect("filter").len(), 1);
        assert_eq!(log.get_by_action("replace_stubs").expect("filter").len(), 1);
        let failed = log.get_failed().expect("failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action, "archive");
    }

    #[test]
    fn reverse_returns_newest_first() {
        let dir = tempdir().expect("tempdir");
        let log = log_in(dir.path());
        for i in 0..3 {
            log.append(
                &TransactionEntry::new("4", "replace_stubs", TxStatus::Success)
                    .with_target(format!("file-{i}.md")),
            )
            .expect("append");
        }

        let reversed = log.get_reverse().expect("reverse");
        assert_eq!(reversed[0].target.as_deref(), Some("file-2.md"));
        assert_eq!(reversed[2].target.as_deref(), Some("file-0.md"));
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let log = log_in(dir.path());
        assert!(log.read().expect("read").is_empty());
        assert!(log.archive().expect("archive").is_none());
    }

    #[test]
    fn archive_renames_and_truncates() {
        let dir = tempdir().expect("tempdir");
        let log = log_in(dir.path());
        log.append(&TransactionEntry::new("0", "backup", TxStatus::Success))
            .expect("append");

        let archived = log.archive().expect("archive").expect("path");
        let name = archived.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("transaction_"), "name {name}");
        assert!(name.ends_with(".log"));

        assert!(log.path().exists());
        assert!(log.read().expect("read").is_empty());
        assert_eq!(
            fs::read_to_string(&archived).expect("read").lines().count(),
            1
        );
    }
}
