//! Task record: one compute task created for a job.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::ids::{JobId, TaskId};

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Succeeded | Failed
/// - any non-terminating state -> Terminating (stop requested)
///
/// A terminating task is removed once its stop is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Created, not yet running.
    Pending,

    /// Currently executing.
    Running,

    /// Exited successfully.
    Succeeded,

    /// Exited with an error.
    Failed,

    /// Stop requested, not yet confirmed.
    Terminating,
}

impl TaskState {
    /// Has the task exited on its own?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Single source of truth for one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub job_id: JobId,

    /// `{job}-{task}-{index}`; unique within the job.
    pub name: String,

    pub state: TaskState,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, job_id: JobId, name: String) -> Self {
        let now = Instant::now();
        Self {
            task_id,
            job_id,
            name,
            state: TaskState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Task name for replica `index` of task group `task` in job `job`.
    pub fn task_name(job: &str, task: &str, index: u32) -> String {
        format!("{job}-{task}-{index}")
    }

    pub fn mark_running(&mut self) {
        self.state = TaskState::Running;
        self.updated_at = Instant::now();
    }

    pub fn mark_finished(&mut self, succeeded: bool) {
        self.state = if succeeded {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };
        self.updated_at = Instant::now();
    }

    /// Request a stop. Returns false if a stop was already requested.
    pub fn request_stop(&mut self) -> bool {
        if self.state == TaskState::Terminating {
            return false;
        }
        self.state = TaskState::Terminating;
        self.updated_at = Instant::now();
        true
    }
}
