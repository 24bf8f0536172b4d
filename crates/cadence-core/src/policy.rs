//! Phase policy: given a status snapshot, which phase comes next.
//!
//! A policy is a value, not a closure. States pick one and hand it to a
//! reconciler, which evaluates it against the snapshot it observes after
//! reconciling tasks. Evaluation is a pure function of `(spec, status)`.

use serde::{Deserialize, Serialize};

use crate::domain::{JobSpec, JobState, JobStatus, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhasePolicy {
    /// `idle` when no task is terminating, otherwise `busy`.
    KillTo { idle: Phase, busy: Phase },

    /// `Running` once `running >= min_available`, otherwise `Pending`.
    AwaitMinAvailable,

    /// `Restarting` while any task is terminating, then as `AwaitMinAvailable`.
    AwaitTermination,

    /// `Completed` once every task has succeeded or failed, otherwise `Running`.
    RunToCompletion,

    /// `draining` while any task is alive, otherwise `settled`.
    Drain { draining: Phase, settled: Phase },

    /// Always the given phase.
    Fixed(Phase),

    /// Whatever phase the snapshot already has.
    Keep,
}

impl PhasePolicy {
    pub fn evaluate(&self, spec: &JobSpec, status: &JobStatus) -> JobState {
        let phase = match *self {
            PhasePolicy::KillTo { idle, busy } => {
                if status.terminating == 0 {
                    idle
                } else {
                    busy
                }
            }
            PhasePolicy::AwaitMinAvailable => min_available_phase(spec, status),
            PhasePolicy::AwaitTermination => {
                if status.terminating != 0 {
                    Phase::Restarting
                } else {
                    min_available_phase(spec, status)
                }
            }
            PhasePolicy::RunToCompletion => {
                let total = spec.total_tasks();
                if total > 0 && status.succeeded + status.failed == total {
                    Phase::Completed
                } else {
                    Phase::Running
                }
            }
            PhasePolicy::Drain { draining, settled } => {
                if status.alive() != 0 {
                    draining
                } else {
                    settled
                }
            }
            PhasePolicy::Fixed(phase) => phase,
            PhasePolicy::Keep => status.phase(),
        };
        JobState::new(phase)
    }
}

// Readiness test for both Pending's reconcile path and the Restarting exit.
fn min_available_phase(spec: &JobSpec, status: &JobStatus) -> Phase {
    if status.running >= spec.min_available {
        Phase::Running
    } else {
        Phase::Pending
    }
}
