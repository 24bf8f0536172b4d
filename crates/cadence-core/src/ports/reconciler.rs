//! JobReconciler port - task の起動・停止と phase の commit
//!
//! State は phase を直接書き換えません。どの方向に reconcile するか
//! （sync / kill）と PhasePolicy を選び、ここに渡すだけです。

use async_trait::async_trait;

use crate::domain::{ControllerError, JobInfo};
use crate::policy::PhasePolicy;

/// The two reconciliation primitives a state delegates to.
///
/// Both follow the same contract:
/// 1. read the current status snapshot of `job`
/// 2. reconcile tasks (create missing ones for `sync_job`, stop alive ones for `kill_job`)
/// 3. evaluate `policy` against the updated snapshot
/// 4. persist the resulting phase and counters
///
/// On error nothing is persisted; the job keeps its previous phase.
/// Implementations must serialize steps 1-4 per job.
#[async_trait]
pub trait JobReconciler: Send + Sync {
    /// Drive task creation toward the job spec, then commit `policy`'s phase.
    async fn sync_job(&self, job: &JobInfo, policy: PhasePolicy) -> Result<(), ControllerError>;

    /// Stop every alive task, then commit `policy`'s phase.
    async fn kill_job(&self, job: &JobInfo, policy: PhasePolicy) -> Result<(), ControllerError>;
}
