//! `SchedulerDaemon`: owns the store pool and the scheduler's background
//! loops, combined in one `tokio::select!` driver alongside graceful
//! shutdown (§10.6). Mirrors the teacher's `Daemon`/`run_loops()` shape,
//! substituting the scheduler-tick / stale-monitor / retention intervals
//! for the teacher's patrol/heartbeat/kpi tickers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kh_core::config::Config;
use kh_core::domain::{AttackMode, JobExecution};
use kh_core::error::{KrakenError, KrakenResult};
use kh_scheduler::{
    AgentSessionTracker, JobDispatchInfo, RetentionWorker, SchedulerLoop, StaleTaskMonitor,
    TaskLifecycle,
};
use kh_store::{AgentStore, HashlistStore, JobStore, PgAgentStore, PgHashlistStore, PgJobStore, PgRetentionStore};
use kh_telemetry::{EventBus, MetricsCollector, ShutdownSignal};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct SchedulerDaemon {
    config: Config,
    pool: PgPool,
    jobs: Arc<dyn JobStore>,
    scheduler: SchedulerLoop,
    stale_monitor: StaleTaskMonitor,
    session_tracker: Arc<AgentSessionTracker>,
    retention_worker: RetentionWorker,
    events: EventBus,
    metrics: Arc<MetricsCollector>,
    shutdown: ShutdownSignal,
}

impl SchedulerDaemon {
    pub fn new(config: Config, pool: PgPool) -> Self {
        let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
        let agents: Arc<dyn AgentStore> = Arc::new(PgAgentStore::new(pool.clone()));
        let hashlists: Arc<dyn HashlistStore> = Arc::new(PgHashlistStore::new(pool.clone()));
        let retention: Arc<dyn kh_store::RetentionStore> = Arc::new(PgRetentionStore::new(pool.clone()));
        let events = EventBus::new();
        let metrics = Arc::new(MetricsCollector::with_defaults());
        let potfile = Arc::new(kh_scheduler::PotfileWriter::new(config.potfile.directory.clone()));

        let lifecycle = Arc::new(TaskLifecycle::new(
            jobs.clone(),
            agents.clone(),
            hashlists,
            events.clone(),
            potfile,
            config.retry.max_consecutive_job_failures,
        ));

        let heartbeat_timeout = chrono::Duration::seconds(config.agent.heartbeat_timeout_seconds as i64);
        let stale_threshold = chrono::Duration::seconds(config.agent.stale_task_threshold_seconds as i64);
        let reconnect_grace = chrono::Duration::seconds(config.agent.reconnect_grace_seconds as i64);

        let scheduler = SchedulerLoop::new(
            jobs.clone(),
            agents.clone(),
            lifecycle.clone(),
            events.clone(),
            heartbeat_timeout,
            config.scheduler.max_chunk_size,
        );

        let stale_monitor = StaleTaskMonitor::new(
            jobs.clone(),
            agents.clone(),
            lifecycle.clone(),
            events.clone(),
            stale_threshold,
            heartbeat_timeout,
        );

        let session_tracker = Arc::new(AgentSessionTracker::new(agents.clone(), lifecycle.clone(), reconnect_grace));

        let retention_worker = RetentionWorker::new(retention);

        Self {
            config,
            pool,
            jobs,
            scheduler,
            stale_monitor,
            session_tracker,
            retention_worker,
            events,
            metrics,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_tracker(&self) -> Arc<AgentSessionTracker> {
        self.session_tracker.clone()
    }

    /// Runs the scheduler tick, stale-task monitor, retention worker, and
    /// reconnect-grace sweeper on independent `tokio::time::interval`
    /// tickers until `shutdown.trigger()` is called. Consumes the first
    /// immediate tick of each interval so the four loops don't all fire in
    /// the same instant at startup.
    pub async fn run_loops(&self) {
        let mut scheduler_interval =
            tokio::time::interval(Duration::from_secs(self.config.scheduler.tick_interval_seconds));
        let mut stale_interval =
            tokio::time::interval(Duration::from_secs(self.config.agent.stale_monitor_interval_seconds));
        let mut retention_interval =
            tokio::time::interval(Duration::from_secs(self.config.retention.sweep_interval_seconds));
        let mut grace_interval = tokio::time::interval(Duration::from_secs(5));

        scheduler_interval.tick().await;
        stale_interval.tick().await;
        retention_interval.tick().await;
        grace_interval.tick().await;

        let mut shutdown_rx = self.shutdown.subscribe();

        info!("scheduler daemon background loops starting");

        loop {
            tokio::select! {
                _ = scheduler_interval.tick() => {
                    self.run_scheduler_tick().await;
                }
                _ = stale_interval.tick() => {
                    self.run_stale_sweep().await;
                }
                _ = retention_interval.tick() => {
                    self.run_retention_sweep().await;
                }
                _ = grace_interval.tick() => {
                    self.run_grace_sweep().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping background loops");
                    break;
                }
            }
        }
    }

    async fn run_scheduler_tick(&self) {
        let now = Utc::now();
        let histogram_start = std::time::Instant::now();

        let jobs = match self.jobs.list_dispatchable_jobs().await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "failed to list dispatchable jobs");
                return;
            }
        };

        let dispatch_info = match resolve_dispatch_info(&self.pool, &jobs).await {
            Ok(map) => map,
            Err(err) => {
                error!(error = %err, "failed to resolve job dispatch info");
                return;
            }
        };

        match self.scheduler.tick(now, &dispatch_info).await {
            Ok(summary) => {
                self.metrics.record_histogram(
                    "scheduler_tick_duration_seconds",
                    histogram_start.elapsed().as_secs_f64(),
                );
                self.metrics
                    .increment_counter_by("tasks_dispatched_total", &[], summary.dispatched_task_ids.len() as u64);
                self.metrics
                    .increment_counter_by("jobs_preempted_total", &[], summary.preempted_job_ids.len() as u64);
                if !summary.dispatched_task_ids.is_empty() || !summary.preempted_job_ids.is_empty() {
                    info!(
                        dispatched = summary.dispatched_task_ids.len(),
                        preempted = summary.preempted_job_ids.len(),
                        "scheduler tick"
                    );
                }
            }
            Err(err) => error!(error = %err, "scheduler tick failed"),
        }
    }

    async fn run_stale_sweep(&self) {
        match self.stale_monitor.sweep(Utc::now()).await {
            Ok(summary) => {
                if !summary.reset_task_ids.is_empty() || !summary.reping_task_ids.is_empty() {
                    info!(
                        reset = summary.reset_task_ids.len(),
                        repinged = summary.reping_task_ids.len(),
                        "stale-task sweep"
                    );
                }
            }
            Err(err) => error!(error = %err, "stale-task sweep failed"),
        }
    }

    async fn run_retention_sweep(&self) {
        match self.retention_worker.sweep(Utc::now()).await {
            Ok(summary) => {
                if !summary.deleted_hashlist_ids.is_empty() {
                    info!(deleted = summary.deleted_hashlist_ids.len(), "retention sweep");
                }
                for (id, err) in &summary.failed {
                    warn!(id, error = %err, "retention sweep item failed");
                }
            }
            Err(err) => error!(error = %err, "retention sweep failed"),
        }
    }

    async fn run_grace_sweep(&self) {
        match self.session_tracker.sweep_expired_grace(Utc::now()).await {
            Ok(reset) if !reset.is_empty() => {
                info!(count = reset.len(), "reconnect grace expired, tasks reset for retry");
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "reconnect grace sweep failed"),
        }
    }
}

/// Joins `job_executions` against `preset_jobs`/`hashlists` to resolve the
/// per-tick inputs the Chunk Sizer needs (§4.2) that the job/agent stores
/// don't carry on their own. `total_rule_count` is `multiplication_factor`
/// for straight-mode jobs with rules attached (§4.1: that field already
/// holds `Σ rule counts` for mode 0), zero otherwise.
async fn resolve_dispatch_info(
    pool: &PgPool,
    jobs: &[JobExecution],
) -> KrakenResult<HashMap<Uuid, JobDispatchInfo>> {
    let mut out = HashMap::with_capacity(jobs.len());
    if jobs.is_empty() {
        return Ok(out);
    }

    let job_ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
    let rows: Vec<(Uuid, i32, i32, i32)> = sqlx::query_as(
        r#"
        SELECT je.id, pj.attack_mode, hl.hash_type_id, pj.chunk_duration_seconds::integer
        FROM job_executions je
        JOIN preset_jobs pj ON pj.id = je.preset_job_id
        JOIN hashlists hl ON hl.id = je.hashlist_id
        WHERE je.id = ANY($1)
        "#,
    )
    .bind(&job_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| KrakenError::InternalError(format!("resolve dispatch info: {e}")))?;

    let by_id: HashMap<Uuid, JobExecution> = jobs.iter().cloned().map(|j| (j.id, j)).collect();

    for (job_id, attack_mode_raw, hash_type, chunk_duration_seconds) in rows {
        let Some(job) = by_id.get(&job_id) else { continue };
        let Some(attack_mode) = AttackMode::from_i32(attack_mode_raw) else {
            warn!(job_id = %job_id, attack_mode_raw, "unknown attack mode, skipping job this tick");
            continue;
        };
        let total_rule_count = if matches!(attack_mode, AttackMode::Straight) {
            job.multiplication_factor
        } else {
            0
        };
        out.insert(
            job_id,
            JobDispatchInfo {
                attack_mode,
                hash_type,
                chunk_duration_seconds: chunk_duration_seconds.max(0) as u64,
                total_rule_count,
            },
        );
    }

    Ok(out)
}
