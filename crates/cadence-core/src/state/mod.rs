//! State - phase ごとの遷移判断
//!
//! `State` は job を借用するだけの一時的な値です。`execute` のたびに作り直し、
//! phase と action から `Transition` を引いて reconciler に渡します。
//! phase の書き込みは reconciler の commit だけが行います。

mod transition;

pub use self::transition::{Direction, Transition, transition};

use crate::domain::{Action, ControllerError, JobInfo, Phase};
use crate::ports::JobReconciler;

/// Decision point for one job in its current phase.
#[derive(Debug, Clone, Copy)]
pub struct State<'a> {
    job: &'a JobInfo,
}

impl<'a> State<'a> {
    pub fn new(job: &'a JobInfo) -> Self {
        Self { job }
    }

    pub fn phase(&self) -> Phase {
        self.job.phase()
    }

    /// What `execute` would do for `action`, without doing it.
    pub fn plan(&self, action: Action) -> Transition {
        transition(self.phase(), action)
    }

    /// Hand the transition for `action` to the reconciler.
    ///
    /// Collaborator errors are returned as-is.
    pub async fn execute<R>(&self, reconciler: &R, action: Action) -> Result<(), ControllerError>
    where
        R: JobReconciler + ?Sized,
    {
        let Transition { direction, policy } = self.plan(action);
        tracing::debug!(
            job_id = %self.job.job_id,
            phase = %self.phase(),
            %action,
            ?direction,
            ?policy,
            "executing state"
        );
        match direction {
            Direction::Sync => reconciler.sync_job(self.job, policy).await,
            Direction::Kill => reconciler.kill_job(self.job, policy).await,
        }
    }
}
