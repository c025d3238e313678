//! The six pipeline phases plus the resume gate.
//!
//! Every phase is a function over a shared [`PhaseContext`] and the mutable
//! [`RunState`]; the orchestrator owns ordering and checkpointing.

use chrono::NaiveDate;

use polish_similarity::{EmbeddingCache, EmbeddingProvider};
use polish_storage::{BackupStore, TransactionLog};

use crate::config::PolishConfig;
use crate::console::Console;
use crate::paths::WorkspacePaths;

pub mod discover;
pub mod extract;
pub mod init;
pub mod organize;
pub mod resume;
pub mod update;
pub mod validate;

/// Shared, read-only phase inputs.
pub struct PhaseContext<'a> {
    pub config: &'a PolishConfig,
    pub paths: &'a WorkspacePaths,
    pub backups: &'a BackupStore,
    pub txlog: &'a TransactionLog,
    pub console: &'a Console,
    pub today: NaiveDate,
    pub dry_run: bool,
    pub embeddings: Option<(&'a EmbeddingCache, &'a dyn EmbeddingProvider)>,
}

/// Inclusive discovery window: `[today − lookback_days, today]`.
pub fn lookback_range(today: NaiveDate, lookback_days: i64) -> (NaiveDate, NaiveDate) {
    (today - chrono::Duration::days(lookback_days), today)
}

/// `YYYY-MM-DD` rendering of an extraction id's date prefix.
pub(crate) fn entry_date(extraction_id: &str) -> String {
    let digits = &extraction_id[..extraction_id.len().min(8)];
    if digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8])
    } else {
        extraction_id.to_string()
    }
}
