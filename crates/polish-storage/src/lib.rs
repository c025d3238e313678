//! Crash-safety storage for memory-polish.
//!
//! Three disciplines back the pipeline's all-or-nothing guarantee:
//!
//! - `backup`: content-addressed copies of every file that may be modified,
//!   keyed by SHA-256 and therefore deduplicated,
//! - `txlog`: an append-only JSONL audit record whose reverse traversal
//!   drives rollback,
//! - `checkpoint`: an atomically-persisted snapshot of the run state that
//!   lets an interrupted run resume at the last completed phase.

pub mod backup;
pub mod checkpoint;
pub mod txlog;

pub use backup::BackupStore;
pub use checkpoint::{generate_session_id, Checkpoint, CheckpointStore, RunStats, CHECKPOINT_VERSION};
pub use txlog::{TransactionEntry, TransactionLog, TxStatus};
