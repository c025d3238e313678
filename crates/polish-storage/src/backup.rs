//! Content-addressed backup store.
//!
//! Backups live under `.polish-cache/backups/` as `<sha256>.md`. Identical
//! file contents share one record, so `create` is idempotent and safe to
//! call again on resume. Restoration during rollback writes directly (the
//! workspace is already in a failed state; atomicity buys nothing there).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};

use polish_core::digest::sha256_hex;
use polish_core::fsio::write_atomic;

pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.md"))
    }

    /// Store `bytes` under their content hash (computed when not supplied).
    /// Returns `(hash, record_path)`; an existing record short-circuits.
    pub fn create(&self, bytes: &[u8], hash: Option<&str>) -> Result<(String, PathBuf)> {
        let hash = match hash {
            Some(h) => h.to_string(),
            None => sha256_hex(bytes),
        };
        let path = self.record_path(&hash);
        if path.exists() {
            return Ok((hash, path));
        }
        write_atomic(&path, bytes)?;
        Ok((hash, path))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.record_path(hash).exists()
    }

    /// Write the backed-up bytes for `hash` to `target`.
    pub fn restore(&self, hash: &str, target: &Path) -> Result<()> {
        let path = self.record_path(hash);
        let bytes = fs::read(&path)
            .with_context(|| format!("backup record missing for {hash} ({})", path.display()))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(target, &bytes)
            .with_context(|| format!("failed to restore {}", target.display()))
    }

    /// Delete records older than `max_age_hours`; returns how many went.
    pub fn clean_old(&self, max_age_hours: u64) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(max_age_hours.saturating_mul(3600)))
            .ok_or_else(|| anyhow!("cleanup age {max_age_hours}h underflows the clock"))?;

        let mut removed = 0;
        for entry in
            fs::read_dir(&self.dir).with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let mtime = entry.metadata()?.modified()?;
            if mtime < cutoff {
                fs::remove_file(entry.path())
                    .with_context(|| format!("failed to remove {}", entry.path().display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_is_content_addressed_and_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = BackupStore::new(&dir.path().join("backups"));

        let (h1, p1) = store.create(b"same bytes", None).expect("create");
        let (h2, p2) = store.create(b"same bytes", None).expect("create again");
        assert_eq!(h1, h2);
        assert_eq!(p1, p2);
        assert_eq!(h1, sha256_hex(b"same bytes"));

        let records: Vec<_> = fs::read_dir(store.dir()).expect("list").collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn create_accepts_a_precomputed_hash() {
        let dir = tempdir().expect("tempdir");
        let store = BackupStore::new(&dir.path().join("backups"));

        let hash = sha256_hex(b"payload");
        let (h, p) = store.create(b"payload", Some(&hash)).expect("create");
        assert_eq!(h, hash);
        assert!(p.ends_with(format!("{hash}.md")));
    }

    #[test]
    fn restore_writes_original_bytes_to_target() {
        let dir = tempdir().expect("tempdir");
        let store = BackupStore::new(&dir.path().join("backups"));
        let (hash, _) = store.create(b"original content", None).expect("create");

        let target = dir.path().join("memory/memory-2026-02-05.md");
        store.restore(&hash, &target).expect("restore");
        assert_eq!(fs::read(&target).expect("read"), b"original content");
    }

    #[test]
    fn restore_of_unknown_hash_errors() {
        let dir = tempdir().expect("tempdir");
        let store = BackupStore::new(&dir.path().join("backups"));
        let err = store
            .restore(&"0".repeat(64), &dir.path().join("out.md"))
            .unwrap_err();
        assert!(err.to_string().contains("backup record missing"));
    }

    #[test]
    fn clean_old_keeps_fresh_records() {
        let dir = tempdir().expect("tempdir");
        let store = BackupStore::new(&dir.path().join("backups"));
        store.create(b"fresh", None).expect("create");

        let removed = store.clean_old(1).expect("clean");
        assert_eq!(removed, 0);
        assert!(store.contains(&sha256_hex(b"fresh")));
    }
}
