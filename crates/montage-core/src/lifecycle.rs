//! Asset generation lifecycle.
//!
//! ```text
//! pending ──► processing ──► completed
//!    │             │
//!    └─────────────┴───────► failed
//! ```
//!
//! `completed` and `failed` are terminal. Replays of a transition that already happened
//! (at-least-once delivery) are skipped rather than rejected, and a late failure never
//! downgrades a completed asset.

use crate::models::AssetStatus;

/// A requested status change with the data it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Processing { external_task_id: String },
    Completed { file_url: String },
    Failed { error_message: String },
}

impl Transition {
    pub fn target(&self) -> AssetStatus {
        match self {
            Transition::Processing { .. } => AssetStatus::Processing,
            Transition::Completed { .. } => AssetStatus::Completed,
            Transition::Failed { .. } => AssetStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Write the new status.
    Apply,
    /// Leave the row untouched.
    Skip(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move asset from {from} to {to}")]
pub struct TransitionRejected {
    pub from: AssetStatus,
    pub to: AssetStatus,
}

/// Decide whether `transition` may be applied to an asset currently in `current`.
pub fn evaluate_transition(
    current: AssetStatus,
    transition: &Transition,
) -> Result<TransitionDecision, TransitionRejected> {
    use AssetStatus::*;

    let to = transition.target();
    match (current, to) {
        (Pending, Processing) => Ok(TransitionDecision::Apply),
        (Processing, Processing) => Ok(TransitionDecision::Skip("already processing")),

        (Processing, Completed) => Ok(TransitionDecision::Apply),
        (Completed, Completed) => Ok(TransitionDecision::Skip("already completed")),

        (Pending, Failed) | (Processing, Failed) => Ok(TransitionDecision::Apply),
        (Completed, Failed) => Ok(TransitionDecision::Skip("completed assets are never downgraded")),
        (Failed, Failed) => Ok(TransitionDecision::Skip("already failed")),

        (from, to) => Err(TransitionRejected { from, to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AssetStatus::*;

    fn processing() -> Transition {
        Transition::Processing {
            external_task_id: "abc".to_string(),
        }
    }

    fn completed() -> Transition {
        Transition::Completed {
            file_url: "https://cdn/media/generated/x.mp4".to_string(),
        }
    }

    fn failed() -> Transition {
        Transition::Failed {
            error_message: "bad request".to_string(),
        }
    }

    #[test]
    fn forward_transitions_apply() {
        assert_eq!(
            evaluate_transition(Pending, &processing()),
            Ok(TransitionDecision::Apply)
        );
        assert_eq!(
            evaluate_transition(Processing, &completed()),
            Ok(TransitionDecision::Apply)
        );
        assert_eq!(
            evaluate_transition(Pending, &failed()),
            Ok(TransitionDecision::Apply)
        );
        assert_eq!(
            evaluate_transition(Processing, &failed()),
            Ok(TransitionDecision::Apply)
        );
    }

    #[test]
    fn completed_is_never_downgraded() {
        assert!(matches!(
            evaluate_transition(Completed, &failed()),
            Ok(TransitionDecision::Skip(_))
        ));
    }

    #[test]
    fn replays_are_skipped() {
        for (status, t) in [
            (Processing, processing()),
            (Completed, completed()),
            (Failed, failed()),
        ] {
            assert!(matches!(
                evaluate_transition(status, &t),
                Ok(TransitionDecision::Skip(_))
            ));
        }
    }

    #[test]
    fn terminal_states_reject_other_moves() {
        let err = evaluate_transition(Failed, &completed()).unwrap_err();
        assert_eq!(err.from, Failed);
        assert_eq!(err.to, Completed);

        assert!(evaluate_transition(Completed, &processing()).is_err());
        assert!(evaluate_transition(Failed, &processing()).is_err());
        assert!(evaluate_transition(Pending, &completed()).is_err());
    }

    #[test]
    fn rejection_message_names_both_states() {
        let err = evaluate_transition(Failed, &processing()).unwrap_err();
        assert_eq!(err.to_string(), "cannot move asset from failed to processing");
    }
}
