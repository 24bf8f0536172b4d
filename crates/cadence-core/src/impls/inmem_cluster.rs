//! InMemoryCluster - 開発・テスト用の backend
//!
//! `JobStore` と `JobReconciler` の両方を実装します。
//! task は名前（`{job}-{task}-{index}`）で管理し、実際のプロセスは起動しません。
//! task の状態変化（起動・終了・停止の確定）はシミュレーション用のメソッドで進めます。
//!
//! # 排他制御
//! - 全 job を 1 つの Mutex で保護
//! - snapshot 読み出し → task 操作 → commit は同一ロック内で完結

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ControllerError, JobId, JobInfo, JobSpec, JobStatus, Phase, TaskRecord, TaskState,
};
use crate::observability::PhaseCounts;
use crate::policy::PhasePolicy;
use crate::ports::{Clock, IdGenerator, JobReconciler, JobStore, SystemClock, UlidGenerator};

/// One job plus the tasks created for it.
#[derive(Debug, Clone)]
struct JobEntry {
    info: JobInfo,

    /// Tasks keyed by name. A terminating task keeps its name until confirmed.
    tasks: BTreeMap<String, TaskRecord>,
}

impl JobEntry {
    fn new(info: JobInfo) -> Self {
        Self {
            info,
            tasks: BTreeMap::new(),
        }
    }

    /// Create every task name the job spec lists that does not exist yet.
    fn create_missing_tasks(&mut self, ids: &dyn IdGenerator) -> u32 {
        let mut created = 0;
        for task in &self.info.spec.tasks {
            for index in 0..task.replicas {
                let name = TaskRecord::task_name(&self.info.name, &task.name, index);
                if self.tasks.contains_key(&name) {
                    continue;
                }
                let record = TaskRecord::new(ids.generate_task_id(), self.info.job_id, name.clone());
                self.tasks.insert(name, record);
                created += 1;
            }
        }
        created
    }

    /// Request a stop for every task that is not already terminating.
    fn stop_tasks(&mut self) -> u32 {
        let mut stopped = 0;
        for task in self.tasks.values_mut() {
            if task.request_stop() {
                stopped += 1;
            }
        }
        stopped
    }

    /// Current counters, carrying over the committed phase and history.
    fn observe(&self) -> JobStatus {
        let previous = &self.info.status;
        let mut status = JobStatus {
            state: previous.state,
            min_available: self.info.spec.min_available,
            retry_count: previous.retry_count,
            last_transition_at: previous.last_transition_at,
            ..JobStatus::default()
        };
        for task in self.tasks.values() {
            match task.state {
                TaskState::Pending => status.pending += 1,
                TaskState::Running => status.running += 1,
                TaskState::Succeeded => status.succeeded += 1,
                TaskState::Failed => status.failed += 1,
                TaskState::Terminating => status.terminating += 1,
            }
        }
        status
    }

    /// Evaluate `policy` against the observed counters and persist the result.
    fn commit(&mut self, policy: PhasePolicy, clock: &dyn Clock) -> (Phase, Phase) {
        let previous = self.info.status.phase();
        let mut status = self.observe();
        status.state = policy.evaluate(&self.info.spec, &status);

        let next = status.phase();
        if next != previous {
            status.last_transition_at = Some(clock.now());
            if next == Phase::Restarting {
                status.retry_count += 1;
            }
        }
        self.info.status = status;
        (previous, next)
    }
}

struct ClusterState {
    jobs: HashMap<JobId, JobEntry>,

    /// Failures armed by `inject_failure`, consumed by the next reconcile call.
    failures: HashMap<JobId, String>,
}

impl ClusterState {
    fn entry_mut(&mut self, job_id: JobId) -> Result<&mut JobEntry, ControllerError> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(ControllerError::JobNotFound(job_id))
    }

    /// Fail before touching anything if a failure was injected for this job.
    fn take_failure(&mut self, job_id: JobId) -> Result<(), ControllerError> {
        match self.failures.remove(&job_id) {
            Some(message) => Err(ControllerError::reconcile(job_id, message)),
            None => Ok(()),
        }
    }
}

/// In-memory cluster backend.
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Use `clock` for transition timestamps and id generation.
    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                jobs: HashMap::new(),
                failures: HashMap::new(),
            })),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock: Arc::new(clock),
        }
    }

    /// Validate and store a new job in `Pending`. No task is created yet.
    pub async fn submit_job(
        &self,
        name: impl Into<String>,
        spec: JobSpec,
    ) -> Result<JobId, ControllerError> {
        spec.validate()?;
        let job_id = self.ids.generate_job_id();
        let info = JobInfo::new(job_id, name, spec);
        tracing::info!(%job_id, name = %info.name, "job submitted");

        let mut state = self.state.lock().await;
        state.jobs.insert(job_id, JobEntry::new(info));
        Ok(job_id)
    }

    /// Simulate the runtime picking up pending tasks. Returns how many started.
    pub async fn start_tasks(&self, job_id: JobId) -> Result<u32, ControllerError> {
        let mut state = self.state.lock().await;
        let entry = state.entry_mut(job_id)?;
        let mut started = 0;
        for task in entry.tasks.values_mut() {
            if task.state == TaskState::Pending {
                task.mark_running();
                started += 1;
            }
        }
        Ok(started)
    }

    /// Simulate a task exiting on its own.
    pub async fn finish_task(
        &self,
        job_id: JobId,
        name: &str,
        succeeded: bool,
    ) -> Result<(), ControllerError> {
        let mut state = self.state.lock().await;
        let entry = state.entry_mut(job_id)?;
        let task = entry
            .tasks
            .get_mut(name)
            .ok_or_else(|| ControllerError::Other(format!("task not found: {name}")))?;
        if matches!(task.state, TaskState::Pending | TaskState::Running) {
            task.mark_finished(succeeded);
        }
        Ok(())
    }

    /// Simulate the runtime confirming every requested stop. Returns how many were removed.
    pub async fn confirm_terminations(&self, job_id: JobId) -> Result<u32, ControllerError> {
        let mut state = self.state.lock().await;
        let entry = state.entry_mut(job_id)?;
        let before = entry.tasks.len();
        entry.tasks.retain(|_, task| task.state != TaskState::Terminating);
        Ok((before - entry.tasks.len()) as u32)
    }

    /// Make the next `sync_job` / `kill_job` for `job_id` fail without side effects.
    pub async fn inject_failure(&self, job_id: JobId, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.failures.insert(job_id, message.into());
    }

    /// Task names and states of a job, sorted by name.
    pub async fn tasks(&self, job_id: JobId) -> Result<Vec<(String, TaskState)>, ControllerError> {
        let mut state = self.state.lock().await;
        let entry = state.entry_mut(job_id)?;
        Ok(entry
            .tasks
            .values()
            .map(|task| (task.name.clone(), task.state))
            .collect())
    }

    pub async fn counts_by_phase(&self) -> PhaseCounts {
        let state = self.state.lock().await;
        state.jobs.values().map(|entry| entry.info.phase()).collect()
    }

    fn log_commit(job_id: JobId, (previous, next): (Phase, Phase), status: &JobStatus) {
        if previous != next {
            tracing::info!(
                %job_id,
                from = %previous,
                to = %next,
                running = status.running,
                terminating = status.terminating,
                "job phase changed"
            );
        } else {
            tracing::trace!(%job_id, phase = %next, "job phase unchanged");
        }
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryCluster {
    async fn get_job(&self, job_id: JobId) -> Result<Option<JobInfo>, ControllerError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&job_id).map(|entry| entry.info.clone()))
    }

    async fn list_jobs(&self) -> Result<Vec<JobId>, ControllerError> {
        let state = self.state.lock().await;
        Ok(state.jobs.keys().copied().collect())
    }
}

#[async_trait]
impl JobReconciler for InMemoryCluster {
    async fn sync_job(&self, job: &JobInfo, policy: PhasePolicy) -> Result<(), ControllerError> {
        let mut state = self.state.lock().await;
        state.take_failure(job.job_id)?;
        let entry = state.entry_mut(job.job_id)?;

        let created = entry.create_missing_tasks(self.ids.as_ref());
        if created > 0 {
            tracing::debug!(job_id = %job.job_id, created, "created tasks");
        }
        let transition = entry.commit(policy, self.clock.as_ref());
        Self::log_commit(job.job_id, transition, &entry.info.status);
        Ok(())
    }

    async fn kill_job(&self, job: &JobInfo, policy: PhasePolicy) -> Result<(), ControllerError> {
        let mut state = self.state.lock().await;
        state.take_failure(job.job_id)?;
        let entry = state.entry_mut(job.job_id)?;

        let stopped = entry.stop_tasks();
        if stopped > 0 {
            tracing::debug!(job_id = %job.job_id, stopped, "requested task stops");
        }
        let transition = entry.commit(policy, self.clock.as_ref());
        Self::log_commit(job.job_id, transition, &entry.info.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, TaskSpec};
    use crate::ports::FixedClock;
    use crate::state::State;
    use chrono::{TimeZone, Utc};

    fn spec() -> JobSpec {
        JobSpec::new(3, vec![TaskSpec::new("worker", 3)])
    }

    async fn execute(cluster: &InMemoryCluster, job_id: JobId, action: Action) -> Phase {
        let job = cluster.get_job(job_id).await.unwrap().unwrap();
        State::new(&job).execute(cluster, action).await.unwrap();
        cluster.get_job(job_id).await.unwrap().unwrap().phase()
    }

    async fn status(cluster: &InMemoryCluster, job_id: JobId) -> JobStatus {
        cluster.get_job(job_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn submit_rejects_invalid_spec() {
        let cluster = InMemoryCluster::new();
        let err = cluster
            .submit_job("bad", JobSpec::new(5, vec![TaskSpec::new("worker", 2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidSpec(_)));
        assert_eq!(cluster.counts_by_phase().await.total(), 0);
    }

    #[tokio::test]
    async fn submit_rejects_replica_overflow() {
        let cluster = InMemoryCluster::new();
        let spec = JobSpec::new(
            1,
            vec![TaskSpec::new("ps", u32::MAX), TaskSpec::new("worker", 1)],
        );
        let err = cluster.submit_job("huge", spec).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidSpec(_)));
        assert_eq!(cluster.counts_by_phase().await.total(), 0);
    }

    #[tokio::test]
    async fn sync_creates_tasks_and_waits_for_min_available() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();

        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Pending);
        let tasks = cluster.tasks(job_id).await.unwrap();
        assert_eq!(
            tasks.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            vec!["train-worker-0", "train-worker-1", "train-worker-2"]
        );
        assert_eq!(status(&cluster, job_id).await.pending, 3);

        assert_eq!(cluster.start_tasks(job_id).await.unwrap(), 3);
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Running);
        assert_eq!(status(&cluster, job_id).await.running, 3);
    }

    #[tokio::test]
    async fn restart_cycle_goes_through_restarting() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();
        execute(&cluster, job_id, Action::Reconcile).await;
        cluster.start_tasks(job_id).await.unwrap();
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Running);

        assert_eq!(execute(&cluster, job_id, Action::Restart).await, Phase::Restarting);
        assert_eq!(status(&cluster, job_id).await.terminating, 3);
        assert_eq!(status(&cluster, job_id).await.retry_count, 1);

        // old tasks still hold their names: nothing is recreated yet
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Restarting);
        assert_eq!(cluster.tasks(job_id).await.unwrap().len(), 3);

        assert_eq!(cluster.confirm_terminations(job_id).await.unwrap(), 3);
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Pending);
        assert_eq!(status(&cluster, job_id).await.pending, 3);

        cluster.start_tasks(job_id).await.unwrap();
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Running);
        assert_eq!(status(&cluster, job_id).await.retry_count, 1);
    }

    #[tokio::test]
    async fn restart_on_idle_pending_job_stays_pending() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();

        assert_eq!(execute(&cluster, job_id, Action::Restart).await, Phase::Pending);
        assert_eq!(status(&cluster, job_id).await.retry_count, 0);
    }

    #[tokio::test]
    async fn complete_on_idle_pending_job_completes() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();

        assert_eq!(execute(&cluster, job_id, Action::Complete).await, Phase::Completed);
    }

    #[tokio::test]
    async fn abort_drains_then_resume_restarts() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();
        execute(&cluster, job_id, Action::Reconcile).await;

        assert_eq!(execute(&cluster, job_id, Action::Abort).await, Phase::Aborting);
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Aborting);

        cluster.confirm_terminations(job_id).await.unwrap();
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Aborted);
        assert_eq!(execute(&cluster, job_id, Action::Restart).await, Phase::Aborted);

        assert_eq!(execute(&cluster, job_id, Action::Resume).await, Phase::Restarting);
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Pending);
        assert_eq!(cluster.tasks(job_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn running_job_completes_when_all_tasks_exit() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();
        execute(&cluster, job_id, Action::Reconcile).await;
        cluster.start_tasks(job_id).await.unwrap();
        execute(&cluster, job_id, Action::Reconcile).await;

        cluster.finish_task(job_id, "train-worker-0", true).await.unwrap();
        cluster.finish_task(job_id, "train-worker-1", false).await.unwrap();
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Running);

        cluster.finish_task(job_id, "train-worker-2", true).await.unwrap();
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Completed);
        let s = status(&cluster, job_id).await;
        assert_eq!((s.succeeded, s.failed), (2, 1));

        // finished jobs release their tasks but keep the phase
        assert_eq!(execute(&cluster, job_id, Action::Restart).await, Phase::Completed);
        assert_eq!(status(&cluster, job_id).await.terminating, 3);
    }

    #[tokio::test]
    async fn terminate_drains_to_terminated() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();
        execute(&cluster, job_id, Action::Reconcile).await;

        assert_eq!(execute(&cluster, job_id, Action::Terminate).await, Phase::Terminating);
        cluster.confirm_terminations(job_id).await.unwrap();
        assert_eq!(execute(&cluster, job_id, Action::Abort).await, Phase::Terminated);
    }

    #[tokio::test]
    async fn failed_reconcile_commits_nothing() {
        let cluster = InMemoryCluster::new();
        let job_id = cluster.submit_job("train", spec()).await.unwrap();
        execute(&cluster, job_id, Action::Reconcile).await;
        cluster.start_tasks(job_id).await.unwrap();
        let before = status(&cluster, job_id).await;

        cluster.inject_failure(job_id, "etcd timeout").await;
        let job = cluster.get_job(job_id).await.unwrap().unwrap();
        let err = State::new(&job)
            .execute(&cluster, Action::Restart)
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Reconcile { ref message, .. } if message == "etcd timeout"));
        assert_eq!(status(&cluster, job_id).await, before);
        assert!(
            cluster
                .tasks(job_id)
                .await
                .unwrap()
                .iter()
                .all(|(_, s)| *s == TaskState::Running)
        );

        // the failure is consumed; the next cycle goes through
        assert_eq!(execute(&cluster, job_id, Action::Reconcile).await, Phase::Running);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let cluster = InMemoryCluster::new();
        let ghost = JobInfo::new(JobId::generate(), "ghost", spec());

        let err = cluster.sync_job(&ghost, PhasePolicy::Keep).await.unwrap_err();
        assert!(matches!(err, ControllerError::JobNotFound(id) if id == ghost.job_id));
        assert!(cluster.get_job(ghost.job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn phase_change_stamps_transition_time() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let cluster = InMemoryCluster::with_clock(FixedClock::new(at));
        let job_id = cluster.submit_job("train", spec()).await.unwrap();

        execute(&cluster, job_id, Action::Reconcile).await;
        assert_eq!(status(&cluster, job_id).await.last_transition_at, None);

        execute(&cluster, job_id, Action::Complete).await;
        assert_eq!(status(&cluster, job_id).await.last_transition_at, Some(at));
    }

    #[tokio::test]
    async fn counts_by_phase_reflects_commits() {
        let cluster = InMemoryCluster::new();
        let a = cluster.submit_job("a", spec()).await.unwrap();
        let _b = cluster.submit_job("b", spec()).await.unwrap();
        execute(&cluster, a, Action::Complete).await;

        let counts = cluster.counts_by_phase().await;
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(cluster.list_jobs().await.unwrap().len(), 2);
    }
}
