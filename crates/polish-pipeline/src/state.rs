//! The typed run-state record.
//!
//! Each phase updates its own fields by explicit assignment; there is no
//! dynamic key merge anywhere, so the checkpoint round-trip is the only
//! place state crosses a serialization boundary.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;

use polish_ingest::{Extraction, TagStats};
use polish_similarity::{CanonicalMap, MergeProposal};
use polish_storage::{generate_session_id, Checkpoint, RunStats, CHECKPOINT_VERSION};

#[derive(Debug, Clone)]
pub struct RunState {
    pub session_id: String,
    pub started_at: String,
    pub base_path: String,
    pub similarity_method: String,
    pub discovered_topics: BTreeMap<String, TagStats>,
    pub merge_proposals: Vec<MergeProposal>,
    pub canonical_map: CanonicalMap,
    pub extractions: Vec<Extraction>,
    pub files_processed: Vec<String>,
    pub stats: RunStats,
    /// Non-fatal notes surfaced in the session report; not checkpointed.
    pub warnings: Vec<String>,
}

impl RunState {
    pub fn fresh(base_path: &Path) -> Self {
        Self {
            session_id: generate_session_id(),
            started_at: Utc::now().to_rfc3339(),
            base_path: base_path.to_string_lossy().to_string(),
            similarity_method: "levenshtein".to_string(),
            discovered_topics: BTreeMap::new(),
            merge_proposals: Vec::new(),
            canonical_map: CanonicalMap::default(),
            extractions: Vec::new(),
            files_processed: Vec::new(),
            stats: RunStats::default(),
            warnings: Vec::new(),
        }
    }

    pub fn to_checkpoint(
        &self,
        current_phase: u32,
        completed_steps: &[u32],
        status: &str,
    ) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            session_id: self.session_id.clone(),
            started_at: self.started_at.clone(),
            updated_at: Utc::now().to_rfc3339(),
            status: status.to_string(),
            current_phase,
            completed_steps: completed_steps.to_vec(),
            stats: self.stats.clone(),
            discovered_topics: self.discovered_topics.clone(),
            merge_proposals: self.merge_proposals.clone(),
            canonical_map: self.canonical_map.clone(),
            extractions: self.extractions.clone(),
            files_processed: self.files_processed.clone(),
            similarity_method: self.similarity_method.clone(),
            base_path: self.base_path.clone(),
        }
    }

    /// Rebuild run state from a loaded checkpoint; returns the state plus
    /// the completed-steps list the orchestrator resumes against.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> (Self, Vec<u32>) {
        let completed = checkpoint.completed_steps.clone();
        let state = Self {
            session_id: checkpoint.session_id,
            started_at: checkpoint.started_at,
            base_path: checkpoint.base_path,
            similarity_method: checkpoint.similarity_method,
            discovered_topics: checkpoint.discovered_topics,
            merge_proposals: checkpoint.merge_proposals,
            canonical_map: checkpoint.canonical_map,
            extractions: checkpoint.extractions,
            files_processed: checkpoint.files_processed,
            stats: checkpoint.stats,
            warnings: Vec::new(),
        };
        (state, completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_roundtrip_preserves_accumulated_state() {
        let mut state = RunState::fresh(Path::new("/tmp/w"));
        state.similarity_method = "embedding".to_string();
        state.files_processed.push("memory-2026-02-05.md".to_string());
        state.stats.extractions_created = 3;

        let checkpoint = state.to_checkpoint(2, &[0, 1, 2], "running");
        assert_eq!(checkpoint.current_phase, 2);
        assert_eq!(checkpoint.completed_steps, vec![0, 1, 2]);
        assert_eq!(checkpoint.status, "running");

        let (restored, completed) = RunState::from_checkpoint(checkpoint);
        assert_eq!(completed, vec![0, 1, 2]);
        assert_eq!(restored.session_id, state.session_id);
        assert_eq!(restored.similarity_method, "embedding");
        assert_eq!(restored.stats.extractions_created, 3);
        assert_eq!(restored.files_processed, state.files_processed);
    }
}
