//! Job phase: the externally observable lifecycle stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a job.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending | Running -> Restarting -> Pending | Running
/// - Pending | Running -> Aborting -> Aborted -> (resume) Restarting
/// - Pending | Running -> Completing -> Completed
/// - Pending | Running -> Terminating -> Terminated
///
/// The phase is only ever written by a reconciler commit, never by a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for `min_available` tasks to run.
    #[default]
    Pending,

    /// At least `min_available` tasks are running.
    Running,

    /// Old tasks are being torn down before the job starts over.
    Restarting,

    /// Abort requested, tasks still draining.
    Aborting,

    /// Abort settled; no task is alive. Can be resumed.
    Aborted,

    /// Completion requested, tasks still draining.
    Completing,

    /// Finished.
    Completed,

    /// Termination requested, tasks still draining.
    Terminating,

    /// Terminated; no task is alive.
    Terminated,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::Pending,
        Phase::Running,
        Phase::Restarting,
        Phase::Aborting,
        Phase::Aborted,
        Phase::Completing,
        Phase::Completed,
        Phase::Terminating,
        Phase::Terminated,
    ];

    /// Is this a finished phase (nothing left to reconcile)?
    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Completed | Phase::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Running => "running",
            Phase::Restarting => "restarting",
            Phase::Aborting => "aborting",
            Phase::Aborted => "aborted",
            Phase::Completing => "completing",
            Phase::Completed => "completed",
            Phase::Terminating => "terminating",
            Phase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a phase policy: the phase the job should move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobState {
    pub phase: Phase,
}

impl JobState {
    pub fn new(phase: Phase) -> Self {
        Self { phase }
    }
}

impl From<Phase> for JobState {
    fn from(phase: Phase) -> Self {
        Self::new(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_and_terminated_are_finished() {
        let finished: Vec<Phase> = Phase::ALL.into_iter().filter(|p| p.is_finished()).collect();
        assert_eq!(finished, vec![Phase::Completed, Phase::Terminated]);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Phase::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
        assert_eq!(Phase::Aborted.to_string(), "aborted");
    }
}
