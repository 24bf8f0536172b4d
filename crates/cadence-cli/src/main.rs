use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use cadence_core::app::{ControllerConfig, ControllerGroup};
use cadence_core::domain::{Action, JobId, JobSpec, Phase, TaskSpec};
use cadence_core::impls::InMemoryCluster;
use cadence_core::ports::JobStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Poll until the job reaches `phase`.
async fn wait_for(cluster: &InMemoryCluster, job_id: JobId, phase: Phase) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = cluster
            .get_job(job_id)
            .await?
            .with_context(|| format!("{job_id} disappeared"))?;
        if job.phase() == phase {
            println!(
                "{job_id}: phase={} running={} terminating={} retries={}",
                job.phase(),
                job.status.running,
                job.status.terminating,
                job.status.retry_count
            );
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("{job_id} stuck in {} while waiting for {phase}", job.phase());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until the job has `n` tasks.
async fn wait_for_tasks(cluster: &InMemoryCluster, job_id: JobId, n: usize) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while cluster.tasks(job_id).await?.len() != n {
        if tokio::time::Instant::now() >= deadline {
            bail!("{job_id} never got {n} tasks");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// コントローラに action を投げて、期待する phase になるまで待つ
async fn step(
    controller: &ControllerGroup,
    cluster: &InMemoryCluster,
    job_id: JobId,
    action: Action,
    expect: Phase,
) -> anyhow::Result<()> {
    println!("-> {action}");
    controller.enqueue(job_id, action).await;
    wait_for(cluster, job_id, expect).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // (A) 設定: 第 1 引数に TOML のパスがあれば読む
    let config = match std::env::args().nth(1) {
        Some(path) => ControllerConfig::load(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => ControllerConfig::default(),
    };

    // (B) backend と controller を起動
    let cluster = Arc::new(InMemoryCluster::new());
    let controller = ControllerGroup::spawn(&config, Arc::clone(&cluster));

    // (C) job を投入（min_available=3, worker x3）
    let spec = JobSpec::new(3, vec![TaskSpec::new("worker", 3)]);
    let job_id = cluster.submit_job("demo", spec).await?;
    println!("submitted {job_id}");

    // (D) 起動: tasks を作って running まで
    step(&controller, &cluster, job_id, Action::Reconcile, Phase::Pending).await?;
    wait_for_tasks(&cluster, job_id, 3).await?;
    cluster.start_tasks(job_id).await?;
    step(&controller, &cluster, job_id, Action::Reconcile, Phase::Running).await?;

    // (E) restart: 古い tasks の停止を待ってから作り直す
    step(&controller, &cluster, job_id, Action::Restart, Phase::Restarting).await?;
    cluster.confirm_terminations(job_id).await?;
    step(&controller, &cluster, job_id, Action::Reconcile, Phase::Pending).await?;
    cluster.start_tasks(job_id).await?;
    step(&controller, &cluster, job_id, Action::Reconcile, Phase::Running).await?;

    // (F) complete
    step(&controller, &cluster, job_id, Action::Complete, Phase::Completing).await?;
    cluster.confirm_terminations(job_id).await?;
    step(&controller, &cluster, job_id, Action::Reconcile, Phase::Completed).await?;

    let counts = cluster.counts_by_phase().await;
    println!("counts: {}", serde_json::to_string(&counts)?);

    controller.shutdown_and_join().await;
    Ok(())
}
