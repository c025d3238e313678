//! Reverse-order rollback.
//!
//! Walks the transaction log newest-first and restores the pre-modification
//! bytes of every `replace_stubs` target from the content-addressed backup
//! store. Best-effort per record: a record that cannot be restored is
//! reported and skipped, never aborts the traversal.

use anyhow::Result;

use polish_core::digest::is_sha256_hex;
use polish_storage::{BackupStore, TransactionLog};

use crate::console::Console;
use crate::paths::WorkspacePaths;

#[derive(Debug, Default)]
pub struct RollbackSummary {
    pub restored: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: usize,
}

pub fn run(
    paths: &WorkspacePaths,
    backups: &BackupStore,
    txlog: &TransactionLog,
    console: &Console,
) -> Result<RollbackSummary> {
    let mut summary = RollbackSummary::default();

    for entry in txlog.get_reverse()? {
        if entry.action != "replace_stubs" {
            continue;
        }
        let (Some(hash), Some(target)) = (&entry.hash, &entry.target) else {
            console.warn(&format!(
                "rollback: skipping replace_stubs entry from {} missing hash or target",
                entry.timestamp
            ));
            summary.skipped += 1;
            continue;
        };
        if !is_sha256_hex(hash) {
            console.warn(&format!("rollback: skipping malformed hash {hash:?} for {target}"));
            summary.skipped += 1;
            continue;
        }

        let target_path = paths.memory_dir.join(target);
        match backups.restore(hash, &target_path) {
            Ok(()) => {
                console.info(&format!("restored {target}"));
                summary.restored.push(target.clone());
            }
            Err(e) => {
                console.error(&format!("rollback: failed to restore {target}: {e}"));
                summary.failed.push(format!("{target}: {e}"));
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolishConfig;
    use polish_core::digest::sha256_hex;
    use polish_storage::{TransactionEntry, TxStatus};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rollback_restores_modified_files_and_skips_bad_entries() {
        let dir = tempdir().expect("tempdir");
        let config = PolishConfig::default();
        let paths = WorkspacePaths::resolve(dir.path(), &config);
        fs::create_dir_all(&paths.memory_dir).expect("mkdir");
        paths.ensure_generated_dirs().expect("dirs");

        let backups = BackupStore::new(&paths.backups_dir);
        let txlog = TransactionLog::new(&paths.txlog_path);
        let console = Console::default();

        // Original bytes, backed up, then "modified".
        let original = b"## Trading\n#trading\noriginal notes\n";
        let hash = sha256_hex(original);
        backups.create(original, Some(&hash)).expect("backup");
        let log_path = paths.memory_dir.join("memory-2026-02-05.md");
        fs::write(&log_path, "## Trading\n-> stub\n").expect("write modified");

        txlog
            .append(
                &TransactionEntry::new("4", "replace_stubs", TxStatus::Success)
                    .with_target("memory-2026-02-05.md")
                    .with_hash(hash.clone()),
            )
            .expect("append");
        // Entry missing its hash: skipped with a warning, not fatal.
        txlog
            .append(
                &TransactionEntry::new("4", "replace_stubs", TxStatus::Success)
                    .with_target("memory-2026-02-06.md"),
            )
            .expect("append");

        let summary = run(&paths, &backups, &txlog, &console).expect("rollback");
        assert_eq!(summary.restored, vec!["memory-2026-02-05.md"]);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failed.is_empty());
        assert_eq!(fs::read(&log_path).expect("read"), original);
    }
}
