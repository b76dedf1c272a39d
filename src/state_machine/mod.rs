//! # Run State Machine
//!
//! Status lifecycle of a workflow run:
//!
//! ```text
//! Pending ──start──▶ Running ──suspend──▶ Suspended
//!                      ▲  │                  │
//!                      │  └──────resume──────┘
//!                      ▼
//!         Completed | Failed | Cancelled
//! ```
//!
//! The transition table is the only place that decides whether a status change is
//! legal; the engine asks it for every change it persists.

pub mod events;
pub mod states;

pub use events::RunEvent;
pub use states::RunStatus;

use crate::error::{EngineError, EngineResult};

/// Determine the target status for `event` applied in `current`
pub fn transition(current: RunStatus, event: RunEvent) -> EngineResult<RunStatus> {
    let target = match (current, event) {
        (RunStatus::Pending, RunEvent::Start) => RunStatus::Running,
        (RunStatus::Suspended, RunEvent::Resume) => RunStatus::Running,

        (RunStatus::Running, RunEvent::Suspend) => RunStatus::Suspended,

        (RunStatus::Running, RunEvent::Complete) => RunStatus::Completed,

        // A definition can vanish between ticks, so failure is legal before the
        // run has been picked up again.
        (RunStatus::Pending | RunStatus::Running | RunStatus::Suspended, RunEvent::Fail) => {
            RunStatus::Failed
        }

        (RunStatus::Pending | RunStatus::Running | RunStatus::Suspended, RunEvent::Cancel) => {
            RunStatus::Cancelled
        }

        (from, event) => return Err(EngineError::InvalidTransition { from, event }),
    };

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(
            transition(RunStatus::Pending, RunEvent::Start).unwrap(),
            RunStatus::Running
        );
        assert_eq!(
            transition(RunStatus::Running, RunEvent::Suspend).unwrap(),
            RunStatus::Suspended
        );
        assert_eq!(
            transition(RunStatus::Suspended, RunEvent::Resume).unwrap(),
            RunStatus::Running
        );
        assert_eq!(
            transition(RunStatus::Running, RunEvent::Complete).unwrap(),
            RunStatus::Completed
        );
    }

    #[test]
    fn test_terminal_states_reject_events() {
        for status in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            for event in [
                RunEvent::Start,
                RunEvent::Resume,
                RunEvent::Suspend,
                RunEvent::Complete,
                RunEvent::Fail,
                RunEvent::Cancel,
            ] {
                assert!(
                    transition(status, event).is_err(),
                    "{status} should reject {event}"
                );
            }
        }
    }

    #[test]
    fn test_complete_requires_running() {
        let err = transition(RunStatus::Suspended, RunEvent::Complete).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: RunStatus::Suspended,
                event: RunEvent::Complete
            }
        ));
    }

    #[test]
    fn test_cancel_from_any_active_state() {
        for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Suspended] {
            assert_eq!(
                transition(status, RunEvent::Cancel).unwrap(),
                RunStatus::Cancelled
            );
        }
    }
}
