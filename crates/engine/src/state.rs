//! Run lifecycle transition table.
//!
//! `PENDING` is the only initial state. A pending run either starts
//! (`RUNNING`) or is canceled before dispatch; a running run ends in
//! exactly one of `SUCCESS`, `FAILED`, `CANCELED`. Terminal states never
//! change again. An illegal transition is a logic bug in the caller and
//! is rejected before anything is written.

use intake_core::{IntakeError, RunStatus};

pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
    use RunStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Canceled)
            | (Running, Success)
            | (Running, Failed)
            | (Running, Canceled)
    )
}

/// Reject an illegal transition with `InvalidTransition`.
pub fn ensure_transition(from: RunStatus, to: RunStatus) -> Result<(), IntakeError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(IntakeError::InvalidTransition { from, to })
    }
}
