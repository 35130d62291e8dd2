//! Task Lifecycle Manager (§4.4): the state-machine operations a dispatch,
//! an agent report, or the stale monitor drives a [`JobTask`] through.
//! Holds no state of its own beyond the store/event-bus handles; every
//! transition is one call into `kh-store` (or, for cracks, into
//! [`crate::crack_accounting`]) plus an event publish.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kh_core::domain::{AttackMode, JobExecutionStatus, JobTaskDetailedStatus, JobTaskStatus};
use kh_core::error::{KrakenError, KrakenResult};
use kh_store::job_store::NewJobTask;
use kh_store::{AgentStore, HashlistStore, JobStore};
use kh_telemetry::{DomainEvent, EventBus};
use uuid::Uuid;

use crate::crack_accounting::{self, CrackOutcome};
use crate::potfile::PotfileWriter;
use crate::progress_aggregator::{
    job_overall_progress, rewrite_effective_keyspace, task_progress_percent, CompletedChunkActual,
};

pub struct TaskLifecycle {
    jobs: Arc<dyn JobStore>,
    agents: Arc<dyn AgentStore>,
    hashlists: Arc<dyn HashlistStore>,
    events: EventBus,
    potfile: Arc<PotfileWriter>,
    max_consecutive_job_failures: u32,
}

impl TaskLifecycle {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        agents: Arc<dyn AgentStore>,
        hashlists: Arc<dyn HashlistStore>,
        events: EventBus,
        potfile: Arc<PotfileWriter>,
        max_consecutive_job_failures: u32,
    ) -> Self {
        Self {
            jobs,
            agents,
            hashlists,
            events,
            potfile,
            max_consecutive_job_failures,
        }
    }

    /// assign(agent): dispatches a freshly-sized chunk to `agent_id` and
    /// marks the agent busy. `dispatched_delta`/`max_rule_end` come from
    /// the `ChunkSizer` decision the Scheduler Loop already made.
    pub async fn assign(
        &self,
        task: NewJobTask,
        dispatched_delta: i64,
        max_rule_end: Option<i64>,
    ) -> KrakenResult<kh_core::domain::JobTask> {
        let agent_id = task.agent_id;
        let job_id = task.job_execution_id;
        let dispatched = self.jobs.dispatch_task(task, dispatched_delta, max_rule_end).await?;
        self.agents.assign_current_task(agent_id, Some(dispatched.id)).await?;
        self.events.publish(DomainEvent::TaskDispatched {
            task_id: dispatched.id,
            job_id,
            agent_id,
            at: Utc::now(),
        });
        Ok(dispatched)
    }

    /// start: the agent reports the hashcat process is running.
    pub async fn start(&self, task_id: Uuid, started_at: DateTime<Utc>) -> KrakenResult<()> {
        let task = self.jobs.get_task(task_id).await?;
        if task.status != JobTaskStatus::Assigned {
            return Err(KrakenError::conflict(format!(
                "task {task_id} cannot start from status {:?}",
                task.status
            )));
        }
        self.jobs.mark_task_started(task_id, started_at).await
    }

    /// progress(processed, effective_processed, checkpoint): rejected if
    /// the task isn't assigned/running, and dropped silently (not an
    /// error) if it would move `keyspace_processed` backwards — the
    /// out-of-order/duplicate-message rule in §5.
    pub async fn progress(
        &self,
        task_id: Uuid,
        keyspace_processed: i64,
        effective_keyspace_processed: i64,
        checkpoint: DateTime<Utc>,
    ) -> KrakenResult<()> {
        let task = self.jobs.get_task(task_id).await?;
        if !matches!(task.status, JobTaskStatus::Assigned | JobTaskStatus::Running) {
            return Err(KrakenError::conflict(format!(
                "progress reported for task {task_id} in status {:?}",
                task.status
            )));
        }
        if keyspace_processed < task.keyspace_processed
            || effective_keyspace_processed < task.effective_keyspace_processed
        {
            return Ok(());
        }

        let progress_percent = task_progress_percent(effective_keyspace_processed, &task);
        self.jobs
            .record_task_progress(task_id, keyspace_processed, effective_keyspace_processed, progress_percent, checkpoint)
            .await?;

        let processed_delta = effective_keyspace_processed - task.effective_keyspace_processed;
        let job = self.jobs.get_job(task.job_execution_id).await?;
        let mut tasks = self.jobs.list_tasks_for_job(task.job_execution_id).await?;
        if let Some(t) = tasks.iter_mut().find(|t| t.id == task_id) {
            t.effective_keyspace_processed = effective_keyspace_processed;
        }
        let overall = job_overall_progress(&job, &tasks);
        self.jobs.record_progress(task.job_execution_id, processed_delta, overall).await?;
        Ok(())
    }

    /// crack(hash, password, username?): delegates to
    /// [`crack_accounting::record_crack`] and publishes the domain event.
    pub async fn crack(
        &self,
        task_id: Uuid,
        hashlist_id: i64,
        hash_value: &str,
        hash_type_id: i32,
        password: &str,
        username: Option<&str>,
    ) -> KrakenResult<CrackOutcome> {
        let outcome = crack_accounting::record_crack(
            self.hashlists.as_ref(),
            self.jobs.as_ref(),
            task_id,
            hashlist_id,
            hash_value,
            hash_type_id,
            password,
            username,
        )
        .await?;
        if outcome.newly_cracked {
            self.events.publish(DomainEvent::CrackRecorded {
                task_id,
                hashlist_id,
                at: Utc::now(),
            });
        }
        if outcome.append_to_potfile {
            let hashlist = self.hashlists.get_hashlist(hashlist_id).await?;
            self.potfile
                .append(hashlist.client_id, hash_value, username, password)
                .await?;
        }
        Ok(outcome)
    }

    /// complete: finalizes the task, frees the agent, upserts the agent's
    /// benchmark for (attack_mode, hash_type), and — if this was the
    /// job's last outstanding task — marks the job completed.
    pub async fn complete(
        &self,
        task_id: Uuid,
        actual_keyspace: Option<i64>,
        average_speed: f64,
        attack_mode: AttackMode,
        hash_type: i32,
        completed_at: DateTime<Utc>,
    ) -> KrakenResult<()> {
        let task = self.jobs.get_task(task_id).await?;
        let agent_id = task
            .agent_id
            .ok_or_else(|| KrakenError::conflict(format!("task {task_id} has no assigned agent")))?;

        let detailed_status = if task.crack_count > 0 {
            JobTaskDetailedStatus::CompletedWithCracks
        } else {
            JobTaskDetailedStatus::CompletedNoCracks
        };
        self.jobs
            .complete_task(task_id, detailed_status, actual_keyspace, average_speed, completed_at)
            .await?;
        // A task completing successfully clears the job's failure streak —
        // otherwise a job that recovers after some failed chunks would
        // still be one more bad chunk away from tripping `fail()`'s ceiling
        // as if none of the intervening successes had happened.
        self.jobs.reset_job_consecutive_failures(task.job_execution_id).await?;
        self.agents.assign_current_task(agent_id, None).await?;
        self.agents
            .upsert_benchmark(agent_id, attack_mode.as_i32(), hash_type, average_speed, completed_at)
            .await?;

        self.events.publish(DomainEvent::TaskCompleted {
            task_id,
            job_id: task.job_execution_id,
            agent_id,
            at: completed_at,
        });

        // §4.6 cascade correction: a chunk whose actual keyspace differs
        // from its planned window shifts every later, still-provisional
        // sibling task's effective window by the same delta, and may grow
        // the job's own effective_keyspace.
        if let Some(actual) = actual_keyspace {
            let planned = task.effective_window_size();
            let delta = actual - planned;
            if delta != 0 {
                let mut cascade_tasks = self.jobs.list_tasks_for_job(task.job_execution_id).await?;
                if let Some(t) = cascade_tasks.iter_mut().find(|t| t.id == task_id) {
                    t.is_actual_keyspace = true;
                    t.chunk_actual_keyspace = Some(actual);
                }
                let mut completed_actuals: Vec<CompletedChunkActual> = cascade_tasks
                    .iter()
                    .filter(|t| t.is_actual_keyspace)
                    .map(|t| CompletedChunkActual {
                        chunk_number: t.chunk_number,
                        actual_keyspace: t.chunk_actual_keyspace.unwrap_or_else(|| t.effective_window_size()),
                    })
                    .collect();
                completed_actuals.sort_by_key(|c| c.chunk_number);
                let planned_remaining: i64 = cascade_tasks
                    .iter()
                    .filter(|t| !t.is_actual_keyspace && t.chunk_number > task.chunk_number)
                    .map(|t| t.effective_window_size())
                    .sum();
                let current_job = self.jobs.get_job(task.job_execution_id).await?;
                let new_effective_keyspace =
                    rewrite_effective_keyspace(current_job.effective_keyspace, &completed_actuals, planned_remaining);
                self.jobs
                    .apply_keyspace_correction(task.job_execution_id, task.chunk_number, delta, new_effective_keyspace)
                    .await?;
            }
        }

        let job = self.jobs.get_job(task.job_execution_id).await?;
        let tasks = self.jobs.list_tasks_for_job(task.job_execution_id).await?;
        let all_done = !job.has_undispatched_work()
            && tasks.iter().all(|t| t.status.is_terminal());
        if all_done && job.status != JobExecutionStatus::Completed {
            self.jobs
                .update_job_status(task.job_execution_id, JobExecutionStatus::Completed, None)
                .await?;
            self.events.publish(DomainEvent::JobCompleted {
                job_id: task.job_execution_id,
                at: completed_at,
            });
        }
        Ok(())
    }

    /// fail(reason): terminal unless the caller chooses to retry instead
    /// (retry is driven by the Scheduler Loop re-dispatching a task that
    /// [`Self::reset_for_retry`] returned to `pending`, not by this
    /// method). Bumps the job's consecutive-failure counter and fails the
    /// job outright once the configured ceiling is hit.
    pub async fn fail(&self, task_id: Uuid, reason: &str, completed_at: DateTime<Utc>) -> KrakenResult<()> {
        let task = self.jobs.get_task(task_id).await?;
        if let Some(agent_id) = task.agent_id {
            self.agents.assign_current_task(agent_id, None).await?;
        }
        self.jobs.fail_task(task_id, reason, completed_at).await?;

        self.events.publish(DomainEvent::TaskFailed {
            task_id,
            job_id: task.job_execution_id,
            agent_id: task.agent_id.unwrap_or_default(),
            retriable: false,
            at: completed_at,
        });

        let failures = self.jobs.increment_job_consecutive_failures(task.job_execution_id).await?;
        if failures as u32 >= self.max_consecutive_job_failures {
            self.jobs
                .update_job_status(task.job_execution_id, JobExecutionStatus::Failed, None)
                .await?;
        }
        Ok(())
    }

    /// reset_for_retry: returns the task (and its job's reserved keyspace)
    /// to the pool for a fresh assignment. Used both for agent-local
    /// failures under the retry ceiling and for stale/reconnect recovery.
    pub async fn reset_for_retry(&self, task_id: Uuid) -> KrakenResult<()> {
        let task = self.jobs.get_task(task_id).await?;
        if let Some(agent_id) = task.agent_id {
            self.agents.assign_current_task(agent_id, None).await?;
        }
        self.jobs.reset_task_for_retry(task_id).await
    }

    /// cancel: terminal from any non-terminal job status; cancels every
    /// non-terminal task and releases each task's agent.
    pub async fn cancel_job(&self, job_id: Uuid) -> KrakenResult<u64> {
        let tasks = self.jobs.list_active_tasks_for_job(job_id).await?;
        for task in &tasks {
            if let Some(agent_id) = task.agent_id {
                self.agents.assign_current_task(agent_id, None).await?;
            }
        }
        let cancelled = self.jobs.cancel_tasks_for_job(job_id).await?;
        self.jobs
            .update_job_status(job_id, JobExecutionStatus::Cancelled, None)
            .await?;
        Ok(cancelled)
    }

    /// Applied when the agent's session drops mid-task (§4.9); the grace
    /// timer itself lives in [`crate::session_tracker`].
    pub async fn mark_reconnect_pending(&self, task_id: Uuid) -> KrakenResult<()> {
        self.jobs.mark_task_reconnect_pending(task_id).await
    }

    /// The agent reconnected within the grace window and reports the same
    /// task still running: resume in place, no new chunk, no retry.
    pub async fn resume_after_reconnect(&self, task_id: Uuid) -> KrakenResult<()> {
        let task = self.jobs.get_task(task_id).await?;
        if task.status != JobTaskStatus::ReconnectPending {
            return Err(KrakenError::conflict(format!(
                "task {task_id} is not reconnect_pending (status {:?})",
                task.status
            )));
        }
        self.jobs.mark_task_started(task_id, task.started_at.unwrap_or(Utc::now())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockAgentStore, MockHashlistStore, MockJobStore};
    use kh_core::domain::{
        Agent, AgentStatus, Device, DeviceKind, Hash, Hashlist, HashlistStatus, JobExecution,
    };

    fn agent(id: i64) -> Agent {
        Agent {
            id,
            name: format!("agent-{id}"),
            owner_id: 1,
            status: AgentStatus::Active,
            enabled: true,
            scheduling_enabled: true,
            consecutive_failures: 0,
            timezone: chrono_tz::UTC,
            devices: vec![Device {
                device_index: 0,
                name: "GPU0".into(),
                kind: DeviceKind::Gpu,
                enabled: true,
                extra: Default::default(),
            }],
            last_heartbeat: Some(Utc::now()),
            current_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn job(id: Uuid, effective_keyspace: i64) -> JobExecution {
        JobExecution {
            id,
            preset_job_id: 1,
            hashlist_id: 1,
            priority: 500,
            base_keyspace: effective_keyspace,
            multiplication_factor: 1,
            effective_keyspace,
            processed_keyspace: 0,
            dispatched_keyspace: 0,
            overall_progress_percent: 0.0,
            uses_rule_splitting: false,
            rule_split_count: None,
            consecutive_failures: 0,
            max_agents: 0,
            is_small_job: false,
            allow_high_priority_override: false,
            status: JobExecutionStatus::Pending,
            interrupted_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_task(job_id: Uuid, agent_id: i64, start: i64, end: i64) -> NewJobTask {
        NewJobTask {
            id: Uuid::new_v4(),
            job_execution_id: job_id,
            agent_id,
            chunk_number: 1,
            keyspace_start: start,
            keyspace_end: end,
            effective_keyspace_start: start,
            effective_keyspace_end: end,
            is_rule_split_task: false,
            rule_start_index: None,
            rule_end_index: None,
            priority: 500,
            attack_cmd: None,
            benchmark_speed: Some(100.0),
            chunk_duration_seconds: 600,
        }
    }

    fn make_lifecycle(
        jobs: Arc<MockJobStore>,
        agents: Arc<MockAgentStore>,
        hashlists: Arc<MockHashlistStore>,
    ) -> TaskLifecycle {
        TaskLifecycle::new(
            jobs,
            agents,
            hashlists,
            EventBus::new(),
            Arc::new(crate::potfile::PotfileWriter::new(std::env::temp_dir().join("kh-test-potfiles"))),
            5,
        )
    }

    #[tokio::test]
    async fn assign_advances_dispatched_keyspace_and_busies_the_agent() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        agents.seed_agent(agent(1));

        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);
        let task = lifecycle.assign(new_task(job_id, 1, 0, 4), 4, None).await.unwrap();

        assert_eq!(jobs.job(job_id).dispatched_keyspace, 4);
        assert_eq!(agents.current_task(1), Some(task.id));
    }

    #[tokio::test]
    async fn progress_drops_out_of_order_reports() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        agents.seed_agent(agent(1));
        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);
        let task = lifecycle.assign(new_task(job_id, 1, 0, 8), 8, None).await.unwrap();
        lifecycle.start(task.id, Utc::now()).await.unwrap();

        lifecycle.progress(task.id, 4, 4, Utc::now()).await.unwrap();
        lifecycle.progress(task.id, 2, 2, Utc::now()).await.unwrap(); // stale, dropped

        assert_eq!(jobs.task(task.id).effective_keyspace_processed, 4);
        assert_eq!(jobs.job(job_id).processed_keyspace, 4);
    }

    #[tokio::test]
    async fn complete_frees_the_agent_and_records_a_benchmark() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        agents.seed_agent(agent(1));
        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);
        let task = lifecycle.assign(new_task(job_id, 1, 0, 8), 8, None).await.unwrap();
        lifecycle.start(task.id, Utc::now()).await.unwrap();
        lifecycle.progress(task.id, 8, 8, Utc::now()).await.unwrap();

        lifecycle
            .complete(task.id, None, 123.0, AttackMode::Straight, 0, Utc::now())
            .await
            .unwrap();

        assert_eq!(agents.current_task(1), None);
        assert_eq!(jobs.job(job_id).status, JobExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn complete_with_larger_actual_keyspace_shifts_later_sibling_chunks() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 100));
        agents.seed_agent(agent(1));
        agents.seed_agent(agent(2));
        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);

        let mut first = new_task(job_id, 1, 0, 50);
        first.chunk_number = 1;
        let task1 = lifecycle.assign(first, 50, None).await.unwrap();
        lifecycle.start(task1.id, Utc::now()).await.unwrap();

        let mut second = new_task(job_id, 2, 50, 100);
        second.chunk_number = 2;
        let task2 = lifecycle.assign(second, 50, None).await.unwrap();
        lifecycle.start(task2.id, Utc::now()).await.unwrap();

        // task1's planned window was 50, but it actually ground 80.
        lifecycle
            .complete(task1.id, Some(80), 100.0, AttackMode::Straight, 0, Utc::now())
            .await
            .unwrap();

        let shifted = jobs.task(task2.id);
        assert_eq!(shifted.effective_keyspace_start, 80);
        assert_eq!(shifted.effective_keyspace_end, 130);
        assert_eq!(jobs.job(job_id).effective_keyspace, 130);
    }

    #[tokio::test]
    async fn complete_clears_the_jobs_failure_streak() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        agents.seed_agent(agent(1));
        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);

        jobs.increment_job_consecutive_failures(job_id).await.unwrap();
        jobs.increment_job_consecutive_failures(job_id).await.unwrap();
        assert_eq!(jobs.job(job_id).consecutive_failures, 2);

        let task = lifecycle.assign(new_task(job_id, 1, 0, 8), 8, None).await.unwrap();
        lifecycle.start(task.id, Utc::now()).await.unwrap();
        lifecycle.progress(task.id, 8, 8, Utc::now()).await.unwrap();
        lifecycle
            .complete(task.id, None, 123.0, AttackMode::Straight, 0, Utc::now())
            .await
            .unwrap();

        assert_eq!(jobs.job(job_id).consecutive_failures, 0);
    }

    #[tokio::test]
    async fn reset_for_retry_returns_reserved_keyspace_to_the_job() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 100));
        agents.seed_agent(agent(1));
        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);
        let task = lifecycle.assign(new_task(job_id, 1, 0, 20), 20, None).await.unwrap();
        lifecycle.start(task.id, Utc::now()).await.unwrap();
        lifecycle.progress(task.id, 10, 10, Utc::now()).await.unwrap();

        lifecycle.reset_for_retry(task.id).await.unwrap();

        let reset_job = jobs.job(job_id);
        assert_eq!(reset_job.dispatched_keyspace, 0);
        assert_eq!(reset_job.processed_keyspace, 0);
        assert_eq!(jobs.task(task.id).status, JobTaskStatus::Pending);
        assert_eq!(agents.current_task(1), None);
    }

    #[tokio::test]
    async fn fail_trips_the_job_after_the_consecutive_failure_ceiling() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 100));
        agents.seed_agent(agent(1));
        let lifecycle = TaskLifecycle::new(
            jobs.clone(),
            agents.clone(),
            hashlists,
            EventBus::new(),
            Arc::new(crate::potfile::PotfileWriter::new(std::env::temp_dir().join("kh-test-potfiles"))),
            2,
        );

        for _ in 0..2 {
            let task = lifecycle.assign(new_task(job_id, 1, 0, 10), 10, None).await.unwrap();
            lifecycle.fail(task.id, "hashcat exit 1", Utc::now()).await.unwrap();
        }

        assert_eq!(jobs.job(job_id).status, JobExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_job_cancels_every_active_task_and_frees_agents() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 100));
        agents.seed_agent(agent(1));
        let lifecycle = make_lifecycle(jobs.clone(), agents.clone(), hashlists);
        let task = lifecycle.assign(new_task(job_id, 1, 0, 10), 10, None).await.unwrap();

        let cancelled = lifecycle.cancel_job(job_id).await.unwrap();

        assert_eq!(cancelled, 1);
        assert_eq!(jobs.task(task.id).status, JobTaskStatus::Cancelled);
        assert_eq!(jobs.job(job_id).status, JobExecutionStatus::Cancelled);
        assert_eq!(agents.current_task(1), None);
    }

    #[tokio::test]
    async fn s6_crack_propagates_across_hashlists_sharing_a_hash() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        hashlists.seed_hashlist(Hashlist {
            id: 1,
            name: "L1".into(),
            owner_id: 1,
            client_id: 1,
            hash_type_id: 0,
            file_path: "/tmp/l1".into(),
            total_hashes: 1,
            cracked_hashes: 0,
            status: HashlistStatus::Ready,
            exclude_from_potfile: false,
            created_at: Utc::now(),
        });
        hashlists.seed_hashlist(Hashlist {
            id: 2,
            name: "L2".into(),
            owner_id: 1,
            client_id: 1,
            hash_type_id: 0,
            file_path: "/tmp/l2".into(),
            total_hashes: 1,
            cracked_hashes: 0,
            status: HashlistStatus::Ready,
            exclude_from_potfile: false,
            created_at: Utc::now(),
        });
        let h = Hash {
            id: Uuid::new_v4(),
            hash_type_id: 0,
            hash_value: "deadbeef".into(),
            original_hash: None,
            username: None,
            domain: None,
            is_cracked: false,
            password: None,
        };
        hashlists.seed_hash(1, h.clone());
        hashlists.seed_hash(2, h);

        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        let real_task = jobs.seed_running_task(job_id, 1);
        agents.seed_agent(agent(1));
        let lifecycle = make_lifecycle(jobs, agents, hashlists.clone());

        let outcome = lifecycle
            .crack(real_task, 1, "deadbeef", 0, "hunter2", None)
            .await
            .unwrap();
        assert!(outcome.newly_cracked);
        assert_eq!(hashlists.cracked_hashes(1), 1);
        assert_eq!(hashlists.cracked_hashes(2), 1);

        let dup = lifecycle
            .crack(real_task, 1, "deadbeef", 0, "hunter2", None)
            .await
            .unwrap();
        assert!(!dup.newly_cracked);
        assert_eq!(hashlists.cracked_hashes(1), 1);
    }

    #[tokio::test]
    async fn crack_appends_to_the_owning_clients_potfile() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        hashlists.seed_hashlist(Hashlist {
            id: 1,
            name: "L1".into(),
            owner_id: 1,
            client_id: 42,
            hash_type_id: 0,
            file_path: "/tmp/l1".into(),
            total_hashes: 1,
            cracked_hashes: 0,
            status: HashlistStatus::Ready,
            exclude_from_potfile: false,
            created_at: Utc::now(),
        });
        hashlists.seed_hash(
            1,
            Hash {
                id: Uuid::new_v4(),
                hash_type_id: 0,
                hash_value: "cafef00d".into(),
                original_hash: None,
                username: None,
                domain: None,
                is_cracked: false,
                password: None,
            },
        );
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        let real_task = jobs.seed_running_task(job_id, 1);
        agents.seed_agent(agent(1));

        let dir = std::env::temp_dir().join(format!("kh-potfile-test-{}", Uuid::new_v4()));
        let lifecycle = TaskLifecycle::new(
            jobs,
            agents,
            hashlists,
            EventBus::new(),
            Arc::new(crate::potfile::PotfileWriter::new(&dir)),
            5,
        );

        lifecycle.crack(real_task, 1, "cafef00d", 0, "hunter2", Some("alice")).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.join("42.potfile")).await.unwrap();
        assert_eq!(contents, "cafef00d:alice:hunter2\n");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn crack_excluded_from_potfile_writes_nothing() {
        let jobs = Arc::new(MockJobStore::new());
        let agents = Arc::new(MockAgentStore::new());
        let hashlists = Arc::new(MockHashlistStore::new());
        hashlists.seed_hashlist(Hashlist {
            id: 1,
            name: "L1".into(),
            owner_id: 1,
            client_id: 42,
            hash_type_id: 0,
            file_path: "/tmp/l1".into(),
            total_hashes: 1,
            cracked_hashes: 0,
            status: HashlistStatus::Ready,
            exclude_from_potfile: true,
            created_at: Utc::now(),
        });
        hashlists.seed_hash(
            1,
            Hash {
                id: Uuid::new_v4(),
                hash_type_id: 0,
                hash_value: "cafef00d".into(),
                original_hash: None,
                username: None,
                domain: None,
                is_cracked: false,
                password: None,
            },
        );
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id, 8));
        let real_task = jobs.seed_running_task(job_id, 1);
        agents.seed_agent(agent(1));

        let dir = std::env::temp_dir().join(format!("kh-potfile-test-{}", Uuid::new_v4()));
        let lifecycle = TaskLifecycle::new(
            jobs,
            agents,
            hashlists,
            EventBus::new(),
            Arc::new(crate::potfile::PotfileWriter::new(&dir)),
            5,
        );

        lifecycle.crack(real_task, 1, "cafef00d", 0, "hunter2", None).await.unwrap();

        assert!(!dir.join("42.potfile").exists());
    }
}
