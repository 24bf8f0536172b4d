//! Errors - コントローラのエラー型
//!
//! State は collaborator のエラーをそのまま返します（wrap も retry もしない）。
//! retry は reconciliation loop（`app`）の責務です。

use thiserror::Error;

use super::ids::JobId;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    /// Task reconciliation or status persistence failed.
    #[error("reconcile failed for {job_id}: {message}")]
    Reconcile { job_id: JobId, message: String },

    #[error("{0}")]
    Other(String),
}

impl ControllerError {
    pub fn reconcile(job_id: JobId, message: impl Into<String>) -> Self {
        Self::Reconcile {
            job_id,
            message: message.into(),
        }
    }
}
