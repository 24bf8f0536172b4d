use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::config::ControllerConfig;
use super::retry::RetryPolicy;
use super::work_queue::{Request, RetryOutcome, WorkQueue};
use crate::domain::{Action, ControllerError, JobId};
use crate::ports::{JobReconciler, JobStore};
use crate::state::State;

/// Controller handle: reconcile workers plus the optional resync loop.
/// - `request_shutdown()` でワーカー全体が新しい lease を取らなくなる
/// - `shutdown_and_join()` で全タスクの終了を待てる
pub struct ControllerGroup {
    queue: Arc<WorkQueue>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ControllerGroup {
    /// Spawn `config.workers` workers against `backend`.
    pub fn spawn<B>(config: &ControllerConfig, backend: Arc<B>) -> Self
    where
        B: JobStore + JobReconciler + 'static,
    {
        let queue = Arc::new(WorkQueue::new(
            RetryPolicy::from(&config.retry),
            config.max_retries,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(config.workers + 1);
        for worker_id in 0..config.workers {
            let q = Arc::clone(&queue);
            let b = Arc::clone(&backend);
            let rx = shutdown_rx.clone();
            let span = tracing::info_span!("worker", worker_id);
            joins.push(tokio::spawn(worker_loop(q, b, rx).instrument(span)));
        }

        if config.resync_interval_ms > 0 {
            let period = Duration::from_millis(config.resync_interval_ms);
            let q = Arc::clone(&queue);
            let b = Arc::clone(&backend);
            joins.push(tokio::spawn(resync_loop(period, q, b, shutdown_rx)));
        }

        tracing::info!(workers = config.workers, "controller started");
        Self {
            queue,
            shutdown_tx,
            joins,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Ask the controller to run `action` against `job_id`.
    pub async fn enqueue(&self, job_id: JobId, action: Action) {
        self.queue.add(job_id, action).await;
    }

    /// Stop taking new leases. In-flight `execute` calls run to completion.
    pub async fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
        self.queue.shutdown().await;
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown().await;
        for join in self.joins {
            let _ = join.await;
        }
        tracing::info!("controller stopped");
    }
}

async fn worker_loop<B>(queue: Arc<WorkQueue>, backend: Arc<B>, mut shutdown_rx: watch::Receiver<bool>)
where
    B: JobStore + JobReconciler + 'static,
{
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let request = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            request = queue.lease() => request,
        };
        let Some(request) = request else {
            break;
        };

        match reconcile(backend.as_ref(), request).await {
            Ok(()) => {
                tracing::trace!(job_id = %request.job_id, action = %request.action, "reconciled");
            }
            Err(err) => match queue.retry(request).await {
                RetryOutcome::Scheduled(delay) => tracing::warn!(
                    job_id = %request.job_id,
                    action = %request.action,
                    attempts = request.attempts.saturating_add(1),
                    ?delay,
                    error = %err,
                    "reconcile failed, will retry"
                ),
                RetryOutcome::Exhausted => tracing::error!(
                    job_id = %request.job_id,
                    action = %request.action,
                    attempts = request.attempts.saturating_add(1),
                    error = %err,
                    "reconcile failed, giving up"
                ),
                RetryOutcome::ShuttingDown => tracing::debug!(
                    job_id = %request.job_id,
                    action = %request.action,
                    error = %err,
                    "reconcile failed during shutdown, not retrying"
                ),
            },
        }
        queue.done(request.job_id).await;
    }
}

/// One decision cycle: read the job, build its state, execute.
async fn reconcile<B>(backend: &B, request: Request) -> Result<(), ControllerError>
where
    B: JobStore + JobReconciler,
{
    let Some(job) = backend.get_job(request.job_id).await? else {
        tracing::debug!(job_id = %request.job_id, "job is gone, dropping request");
        return Ok(());
    };
    State::new(&job).execute(backend, request.action).await
}

/// Queue a plain reconcile for every known job, every `period`.
async fn resync_loop<B>(
    period: Duration,
    queue: Arc<WorkQueue>,
    backend: Arc<B>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    B: JobStore + 'static,
{
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match backend.list_jobs().await {
                    Ok(jobs) => {
                        tracing::debug!(jobs = jobs.len(), "resync");
                        for job_id in jobs {
                            queue.add(job_id, Action::Reconcile).await;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "resync failed to list jobs"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobSpec, Phase, TaskSpec};
    use crate::impls::InMemoryCluster;

    fn config(resync_interval_ms: u64) -> ControllerConfig {
        let mut config = ControllerConfig {
            workers: 2,
            max_retries: 3,
            resync_interval_ms,
            ..ControllerConfig::default()
        };
        config.retry.base_delay_ms = 5;
        config
    }

    fn spec() -> JobSpec {
        JobSpec::new(2, vec![TaskSpec::new("worker", 2)])
    }

    async fn wait_for_phase(cluster: &InMemoryCluster, job_id: JobId, phase: Phase) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let job = cluster.get_job(job_id).await.unwrap().unwrap();
                if job.phase() == phase {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "job never reached {phase}");
    }

    async fn wait_for_tasks(cluster: &InMemoryCluster, job_id: JobId, n: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while cluster.tasks(job_id).await.unwrap().len() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "job never had {n} tasks");
    }

    #[tokio::test]
    async fn drives_a_job_to_running_and_restarts_after_failure() {
        let cluster = Arc::new(InMemoryCluster::new());
        let controller = ControllerGroup::spawn(&config(0), Arc::clone(&cluster));
        let job_id = cluster.submit_job("train", spec()).await.unwrap();

        controller.enqueue(job_id, Action::Reconcile).await;
        wait_for_tasks(&cluster, job_id, 2).await;

        cluster.start_tasks(job_id).await.unwrap();
        controller.enqueue(job_id, Action::Reconcile).await;
        wait_for_phase(&cluster, job_id, Phase::Running).await;

        // first attempt fails, the retry goes through
        cluster.inject_failure(job_id, "api server unavailable").await;
        controller.enqueue(job_id, Action::Restart).await;
        wait_for_phase(&cluster, job_id, Phase::Restarting).await;

        controller.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn resync_reconciles_without_explicit_requests() {
        let cluster = Arc::new(InMemoryCluster::new());
        let job_id = cluster.submit_job("train", spec()).await.unwrap();
        let controller = ControllerGroup::spawn(&config(10), Arc::clone(&cluster));

        wait_for_tasks(&cluster, job_id, 2).await;
        cluster.start_tasks(job_id).await.unwrap();
        wait_for_phase(&cluster, job_id, Phase::Running).await;

        controller.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn requests_for_unknown_jobs_are_dropped() {
        let cluster = Arc::new(InMemoryCluster::new());
        let controller = ControllerGroup::spawn(&config(0), Arc::clone(&cluster));

        controller.enqueue(JobId::generate(), Action::Abort).await;
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while !controller.queue().is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(drained.is_ok());

        controller.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let cluster = Arc::new(InMemoryCluster::new());
        let controller = ControllerGroup::spawn(&config(10), cluster);

        let stopped = tokio::time::timeout(Duration::from_secs(1), controller.shutdown_and_join()).await;
        assert!(stopped.is_ok());
    }
}
