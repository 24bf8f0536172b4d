//! Domain model (IDs, phases, actions, job specs and status).

pub mod action;
pub mod errors;
pub mod ids;
pub mod job;
pub mod phase;
pub mod task;

pub use action::Action;
pub use errors::ControllerError;
pub use ids::{JobId, TaskId};
pub use job::{JobInfo, JobSpec, JobStatus, TaskSpec};
pub use phase::{JobState, Phase};
pub use task::{TaskRecord, TaskState};
