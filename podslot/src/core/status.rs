//! Single place where a slot's lifecycle status is decided.

use super::types::{RunningState, SlotStatus};

/// Resolve a slot's status from directory presence and runtime state.
///
/// A running container wins over a missing directory: the slot is in use
/// even if someone deleted its state underneath it.
pub fn resolve_status(directory_exists: bool, running: RunningState) -> SlotStatus {
    match (directory_exists, running) {
        (_, RunningState::Running) => SlotStatus::Running,
        (false, _) => SlotStatus::Dead,
        (true, RunningState::NotRunning) => SlotStatus::Allocated,
        (true, RunningState::Unknown) => SlotStatus::Unknown,
    }
}

/// Whether a slot with this status may be handed out for a new run.
pub fn is_free_for_run(status: SlotStatus) -> bool {
    status == SlotStatus::Allocated
}
