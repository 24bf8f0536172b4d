//! Job spec, status snapshot and the job record handed to states.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ControllerError;
use super::ids::JobId;
use super::phase::{JobState, Phase};

/// Declared shape of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Minimum number of concurrently running tasks for the job to be `Running`.
    pub min_available: u32,

    pub tasks: Vec<TaskSpec>,
}

/// A group of identical tasks inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub replicas: u32,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
        }
    }
}

impl JobSpec {
    pub fn new(min_available: u32, tasks: Vec<TaskSpec>) -> Self {
        Self {
            min_available,
            tasks,
        }
    }

    /// Sum of replicas over all task groups, saturating at `u32::MAX`.
    pub fn total_tasks(&self) -> u32 {
        self.tasks
            .iter()
            .fold(0u32, |total, t| total.saturating_add(t.replicas))
    }

    /// Sum of replicas, or `None` if it does not fit in a `u32`.
    pub fn checked_total_tasks(&self) -> Option<u32> {
        self.tasks
            .iter()
            .try_fold(0u32, |total, t| total.checked_add(t.replicas))
    }

    /// Reject specs the controller can never satisfy.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.tasks.is_empty() {
            return Err(ControllerError::InvalidSpec("job has no tasks".to_string()));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(ControllerError::InvalidSpec(
                    "task name must not be empty".to_string(),
                ));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(ControllerError::InvalidSpec(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
        }

        let Some(total) = self.checked_total_tasks() else {
            return Err(ControllerError::InvalidSpec(
                "total replicas overflow u32".to_string(),
            ));
        };
        if self.min_available > total {
            return Err(ControllerError::InvalidSpec(format!(
                "min_available={} exceeds total tasks={}",
                self.min_available, total
            )));
        }
        Ok(())
    }
}

/// Task counters observed at one point in time, plus the committed phase.
///
/// Counters are unsigned, so they are never negative. `terminating` counts
/// tasks whose stop was requested but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub min_available: u32,
    pub pending: u32,
    pub running: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub terminating: u32,

    /// How many times the job entered `Restarting`.
    pub retry_count: u32,

    /// When the phase last changed.
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Tasks not yet stopped: pending, running or terminating.
    pub fn alive(&self) -> u32 {
        self.pending + self.running + self.terminating
    }
}

/// A job as seen by the controller at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: JobId,
    pub name: String,
    pub spec: JobSpec,
    pub status: JobStatus,
}

impl JobInfo {
    pub fn new(job_id: JobId, name: impl Into<String>, spec: JobSpec) -> Self {
        let status = JobStatus {
            min_available: spec.min_available,
            ..JobStatus::default()
        };
        Self {
            job_id,
            name: name.into(),
            spec,
            status,
        }
    }

    pub fn phase(&self) -> Phase {
        self.status.phase()
    }
}
