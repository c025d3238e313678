//! The memory-polish pipeline.
//!
//! One run is a single transactional pass over a workspace:
//!
//! ```text
//! phase 6 (resume gate)
//!    └─► phase 0 init/backup ─► 1 discover ─► 2 extract
//!            ─► 3 organize ─► 4 update ─► 5 validate
//! ```
//!
//! Between phases the orchestrator persists the accumulated [`RunState`] to
//! the checkpoint store; validation failure or any phase error triggers a
//! reverse-order rollback from the transaction log, restoring every
//! modified daily log from its content-addressed backup.

pub mod config;
pub mod console;
pub mod orchestrator;
pub mod paths;
pub mod phases;
pub mod report;
pub mod rollback;
pub mod state;

pub use config::PolishConfig;
pub use console::Console;
pub use orchestrator::{run_pipeline, RunOptions, RunOutcome};
pub use paths::WorkspacePaths;
pub use state::RunState;
