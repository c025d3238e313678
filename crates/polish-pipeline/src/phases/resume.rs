//! Phase 6: the resume gate.
//!
//! Runs before everything else. A completed checkpoint is archived and the
//! run starts fresh; an incomplete one is loaded, summarized and (this
//! being a non-interactive pipeline) resumed by default. `--no-resume`
//! archives it instead; `--force-from-phase` rewinds the completed-steps
//! prefix so phases re-run from the requested id.

use anyhow::{anyhow, Result};

use polish_storage::{Checkpoint, CheckpointStore};

use crate::console::Console;

const PHASE_NAMES: [&str; 6] = [
    "initialize",
    "discover",
    "extract",
    "organize",
    "update",
    "validate",
];

pub enum ResumeDecision {
    Fresh,
    Resume(Box<Checkpoint>),
}

pub fn run(
    store: &CheckpointStore,
    console: &Console,
    enable_checkpoints: bool,
    no_resume: bool,
    force_from_phase: Option<u32>,
) -> Result<ResumeDecision> {
    if let Some(phase) = force_from_phase {
        if phase > 5 {
            return Err(anyhow!("--force-from-phase takes a phase id 0-5, got {phase}"));
        }
    }
    if !enable_checkpoints || !store.exists() {
        return Ok(ResumeDecision::Fresh);
    }

    let Some(mut checkpoint) = store.load()? else {
        return Ok(ResumeDecision::Fresh);
    };

    if checkpoint.is_completed() {
        store.archive()?;
        console.info("previous run completed; archived its checkpoint");
        return Ok(ResumeDecision::Fresh);
    }
    if no_resume {
        store.archive()?;
        console.info("ignoring incomplete checkpoint (--no-resume); starting fresh");
        return Ok(ResumeDecision::Fresh);
    }

    if let Some(phase) = force_from_phase {
        checkpoint.current_phase = phase;
        checkpoint.completed_steps.retain(|step| *step < phase);
    }

    console.info(&format!(
        "resuming session {} (started {})",
        checkpoint.session_id, checkpoint.started_at
    ));
    console.info(&format!(
        "  last phase {} — {}% complete, steps done: {:?}",
        checkpoint.current_phase,
        checkpoint.calculate_progress(),
        checkpoint.completed_steps
    ));
    let pending: Vec<&str> = (0u32..6)
        .filter(|id| !checkpoint.completed_steps.contains(id))
        .map(|id| PHASE_NAMES[id as usize])
        .collect();
    console.info(&format!("  pending phases: {}", pending.join(", ")));

    Ok(ResumeDecision::Resume(Box::new(checkpoint)))
}
