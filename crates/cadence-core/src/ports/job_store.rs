//! JobStore port - job snapshot の読み出し

use async_trait::async_trait;

use crate::domain::{ControllerError, JobId, JobInfo};

/// Read access to the committed job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Latest committed snapshot, or `None` if the job was never submitted.
    async fn get_job(&self, job_id: JobId) -> Result<Option<JobInfo>, ControllerError>;

    /// Every known job id (used by the resync loop).
    async fn list_jobs(&self) -> Result<Vec<JobId>, ControllerError>;
}
