//! Persistent run checkpoints.
//!
//! The orchestrator saves the accumulated run state after every phase
//! boundary; an interrupted run finds the snapshot on the next launch and
//! resumes at the first phase not yet completed. Saves go through
//! `write_atomic`, so the on-disk checkpoint is always a complete snapshot
//! of *some* phase boundary.
//!
//! `load` refuses a checkpoint whose `base_path` differs from the current
//! workspace; resuming someone else's run from the wrong directory would
//! write stubs into the wrong files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use polish_core::fsio::write_atomic;
use polish_ingest::{Extraction, TagStats};
use polish_similarity::{CanonicalMap, MergeProposal};

pub const CHECKPOINT_VERSION: u32 = 2;

/// Number of pipeline phases (0–5); resume progress is reported against it.
const PHASE_COUNT: u32 = 6;

/// Counters accumulated across phases, persisted with the checkpoint and
/// summarized in the session report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunStats {
    pub files_scanned: usize,
    pub tags_discovered: usize,
    pub merge_proposals: usize,
    pub extractions_created: usize,
    pub entries_written: usize,
    pub cross_refs_created: usize,
    pub topic_files_created: usize,
    pub merges_completed: usize,
    pub files_updated: usize,
    pub files_archived: usize,
    pub links_healed: usize,
    pub backups_created: usize,
    pub backup_bytes: u64,
    pub backups_cleaned: usize,
    pub extractions_cleaned: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub session_id: String,
    pub started_at: String,
    pub updated_at: String,
    pub status: String,
    pub current_phase: u32,
    pub completed_steps: Vec<u32>,
    pub stats: RunStats,
    pub discovered_topics: BTreeMap<String, TagStats>,
    pub merge_proposals: Vec<MergeProposal>,
    pub canonical_map: CanonicalMap,
    pub extractions: Vec<Extraction>,
    pub files_processed: Vec<String>,
    pub similarity_method: String,
    pub base_path: String,
}

impl Checkpoint {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    /// Percentage of the six phases completed, floored.
    pub fn calculate_progress(&self) -> u32 {
        (self.current_phase.min(PHASE_COUNT) * 100) / PHASE_COUNT
    }
}

/// `<yyyymmddHHMMSS>-<6 lowercase alphanumerics>`.
pub fn generate_session_id() -> String {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("{stamp}-{suffix}")
}

pub struct CheckpointStore {
    path: PathBuf,
    base_path: String,
}

impl CheckpointStore {
    /// The file path is derived once at construction: `<cache_dir>/<file>`,
    /// guarded by the resolved workspace base.
    pub fn new(cache_dir: &Path, file_name: &str, base_path: &Path) -> Self {
        Self {
            path: cache_dir.join(file_name),
            base_path: base_path.to_string_lossy().to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_vec_pretty(checkpoint)
            .context("failed to serialize checkpoint")?;
        write_atomic(&self.path, &json)
    }

    /// `Ok(None)` when no checkpoint exists; an error when the stored
    /// `base_path` does not match this store's.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt checkpoint at {}", self.path.display()))?;

        if checkpoint.base_path != self.base_path {
            return Err(anyhow!(
                "base path mismatch: checkpoint was created for {} but this run targets {}",
                checkpoint.base_path,
                self.base_path
            ));
        }
        Ok(Some(checkpoint))
    }

    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("failed to delete {}: {e}", self.path.display())),
        }
    }

    /// Rename the checkpoint aside with its `started_at` timestamp,
    /// yielding `checkpoint_<yyyymmddHHMMSS>.json`.
    pub fn archive(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stamp = match self.load() {
            Ok(Some(cp)) => DateTime::parse_from_rfc3339(&cp.started_at)
                .map(|t| t.with_timezone(&Local).format("%Y%m%d%H%M%S").to_string())
                .unwrap_or_else(|_| Local::now().format("%Y%m%d%H%M%S").to_string()),
            _ => Local::now().format("%Y%m%d%H%M%S").to_string(),
        };

        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "checkpoint".to_string());
        let archived = self.path.with_file_name(format!("{stem}_{stamp}.json"));
        fs::rename(&self.path, &archived).with_context(|| {
            format!(
                "failed to archive {} to {}",
                self.path.display(),
                archived.display()
            )
        })?;
        Ok(Some(archived))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(base: &str) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            session_id: generate_session_id(),
            started_at: Utc::now().to_rfc3339(),
            updated_at: Utc::now().to_rfc3339(),
            status: "running".to_string(),
            current_phase: 2,
            completed_steps: vec![0, 1, 2],
            stats: RunStats::default(),
            discovered_topics: BTreeMap::new(),
            merge_proposals: Vec::new(),
            canonical_map: CanonicalMap::default(),
            extractions: Vec::new(),
            files_processed: Vec::new(),
            similarity_method: "levenshtein".to_string(),
            base_path: base.to_string(),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), "checkpoint.json", dir.path());

        let cp = sample(&dir.path().to_string_lossy());
        store.save(&cp).expect("save");
        let loaded = store.load().expect("load").expect("present");
        assert_eq!(loaded.session_id, cp.session_id);
        assert_eq!(loaded.current_phase, 2);
        assert_eq!(loaded.completed_steps, vec![0, 1, 2]);
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), "checkpoint.json", dir.path());
        assert!(store.load().expect("load").is_none());
        assert!(!store.exists());
    }

    #[test]
    fn base_path_mismatch_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), "checkpoint.json", dir.path());
        store.save(&sample("/somewhere/else")).expect("save");

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("base path mismatch"), "err: {err}");
    }

    #[test]
    fn progress_is_floored_percentage_of_six_phases() {
        let dir = tempdir().expect("tempdir");
        let mut cp = sample(&dir.path().to_string_lossy());
        cp.current_phase = 0;
        assert_eq!(cp.calculate_progress(), 0);
        cp.current_phase = 2;
        assert_eq!(cp.calculate_progress(), 33);
        cp.current_phase = 5;
        assert_eq!(cp.calculate_progress(), 83);
        cp.current_phase = 6;
        assert_eq!(cp.calculate_progress(), 100);
    }

    #[test]
    fn session_ids_are_dated_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);

        let (stamp, suffix) = a.split_once('-').expect("dash");
        assert_eq!(stamp.len(), 14);
        assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[test]
    fn archive_renames_with_timestamp_suffix() {
        let dir = tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), "checkpoint.json", dir.path());
        store.save(&sample(&dir.path().to_string_lossy())).expect("save");

        let archived = store.archive().expect("archive").expect("path");
        assert!(!store.exists());
        let name = archived.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("checkpoint_"), "name {name}");
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), "checkpoint.json", dir.path());
        store.delete().expect("delete nothing");
        store.save(&sample(&dir.path().to_string_lossy())).expect("save");
        store.delete().expect("delete");
        assert!(!store.exists());
    }
}
