//! Phase × Action → Transition.
//!
//! One match arm group per phase. Every action an arm does not name falls
//! through to that phase's reconcile path, so an unrecognized action and no
//! action at all always end up in the same place.

use serde::{Deserialize, Serialize};

use crate::domain::{Action, Phase};
use crate::policy::PhasePolicy;

/// Which reconciler primitive a transition goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Start or maintain tasks (`JobReconciler::sync_job`).
    Sync,

    /// Stop tasks (`JobReconciler::kill_job`).
    Kill,
}

/// What a state does for one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub direction: Direction,
    pub policy: PhasePolicy,
}

impl Transition {
    pub fn sync(policy: PhasePolicy) -> Self {
        Self {
            direction: Direction::Sync,
            policy,
        }
    }

    pub fn kill(policy: PhasePolicy) -> Self {
        Self {
            direction: Direction::Kill,
            policy,
        }
    }

    fn kill_to(idle: Phase, busy: Phase) -> Self {
        Self::kill(PhasePolicy::KillTo { idle, busy })
    }

    fn drain(draining: Phase, settled: Phase) -> Self {
        Self::kill(PhasePolicy::Drain { draining, settled })
    }
}

/// The transition table.
pub fn transition(phase: Phase, action: Action) -> Transition {
    match phase {
        Phase::Pending | Phase::Running => match action {
            // Nothing terminating means there was nothing to kill: stay put.
            Action::Restart => Transition::kill_to(phase, Phase::Restarting),
            Action::Abort => Transition::kill_to(phase, Phase::Aborting),
            Action::Complete => Transition::kill_to(Phase::Completed, Phase::Completing),
            Action::Terminate => Transition::kill_to(Phase::Terminated, Phase::Terminating),
            _ if phase == Phase::Pending => Transition::sync(PhasePolicy::AwaitMinAvailable),
            _ => Transition::sync(PhasePolicy::RunToCompletion),
        },

        // Actions are ignored until old tasks are gone.
        Phase::Restarting => Transition::sync(PhasePolicy::AwaitTermination),

        Phase::Aborting => match action {
            Action::Resume => Transition::kill(PhasePolicy::Fixed(Phase::Restarting)),
            _ => Transition::drain(Phase::Aborting, Phase::Aborted),
        },
        Phase::Aborted => match action {
            Action::Resume => Transition::kill(PhasePolicy::Fixed(Phase::Restarting)),
            _ => Transition::kill(PhasePolicy::Keep),
        },

        Phase::Completing => Transition::drain(Phase::Completing, Phase::Completed),
        Phase::Terminating => Transition::drain(Phase::Terminating, Phase::Terminated),

        Phase::Completed | Phase::Terminated => Transition::kill(PhasePolicy::Keep),
    }
}
