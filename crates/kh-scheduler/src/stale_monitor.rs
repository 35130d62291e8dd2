//! Stale-Task Monitor (§4.5): detects tasks silent past a threshold and
//! returns their work to the pool. Runs on its own tick, independent of
//! the Scheduler Loop's dispatch tick, driven by `kh-daemon`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kh_core::domain::{JobExecutionStatus, JobTaskStatus};
use kh_core::error::KrakenResult;
use kh_store::{AgentStore, JobStore};
use kh_telemetry::{DomainEvent, EventBus};
use uuid::Uuid;

use crate::task_lifecycle::TaskLifecycle;

/// Outcome of one monitor sweep: tasks that were reset for retry (work
/// returned to the pool and `retry_count` incremented) versus tasks that
/// were merely asked to re-report because their agent still looks alive.
#[derive(Debug, Clone, Default)]
pub struct StaleSweepSummary {
    pub reset_task_ids: Vec<Uuid>,
    pub reping_task_ids: Vec<Uuid>,
}

pub struct StaleTaskMonitor {
    jobs: Arc<dyn JobStore>,
    agents: Arc<dyn AgentStore>,
    lifecycle: Arc<TaskLifecycle>,
    events: EventBus,
    stale_threshold: chrono::Duration,
    heartbeat_timeout: chrono::Duration,
}

impl StaleTaskMonitor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        agents: Arc<dyn AgentStore>,
        lifecycle: Arc<TaskLifecycle>,
        events: EventBus,
        stale_threshold: chrono::Duration,
        heartbeat_timeout: chrono::Duration,
    ) -> Self {
        Self {
            jobs,
            agents,
            lifecycle,
            events,
            stale_threshold,
            heartbeat_timeout,
        }
    }

    /// One sweep. Only considers tasks belonging to jobs that are still
    /// `pending`/`running` (terminal jobs have no live tasks to recover).
    /// A task whose `updated_at` is within the current cycle is left
    /// alone even if `last_checkpoint` looks old — it was just touched by
    /// something else (§4.5 "never modifies a task updated within the
    /// current cycle").
    pub async fn sweep(&self, now: DateTime<Utc>) -> KrakenResult<StaleSweepSummary> {
        let mut summary = StaleSweepSummary::default();

        let jobs = self.jobs.list_non_terminal_jobs().await?;
        for job in jobs
            .iter()
            .filter(|j| matches!(j.status, JobExecutionStatus::Pending | JobExecutionStatus::Running))
        {
            let tasks = self.jobs.list_active_tasks_for_job(job.id).await?;
            for task in tasks {
                if !matches!(task.status, JobTaskStatus::Assigned | JobTaskStatus::Running) {
                    continue;
                }
                let reference = task.last_checkpoint.unwrap_or(task.updated_at);
                let age = now - reference;
                if age < self.stale_threshold {
                    continue;
                }
                if now - task.updated_at < self.stale_threshold {
                    continue;
                }

                let agent_alive = match task.agent_id {
                    Some(agent_id) => self
                        .agents
                        .get_agent(agent_id)
                        .await
                        .map(|a| a.is_alive(now, self.heartbeat_timeout))
                        .unwrap_or(false),
                    None => false,
                };

                if agent_alive {
                    // The agent's session looks alive; give it one more
                    // cycle to self-report before declaring it lost. A
                    // real daemon would also send a status re-request
                    // over the agent's WebSocket here.
                    summary.reping_task_ids.push(task.id);
                    continue;
                }

                self.lifecycle.reset_for_retry(task.id).await?;
                if let Some(agent_id) = task.agent_id {
                    self.events.publish(DomainEvent::AgentLost { agent_id, at: now });
                }
                summary.reset_task_ids.push(task.id);
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockAgentStore, MockHashlistStore, MockJobStore};
    use kh_core::domain::{
        Agent, AgentStatus, Device, DeviceKind, JobExecution, JobExecutionStatus, JobTask,
        JobTaskDetailedStatus,
    };

    fn agent(id: i64, last_heartbeat: Option<DateTime<Utc>>) -> Agent {
        Agent {
            id,
            name: format!("agent-{id}"),
            owner_id: 1,
            status: AgentStatus::Active,
            enabled: true,
            scheduling_enabled: false,
            consecutive_failures: 0,
            timezone: chrono_tz::UTC,
            devices: vec![Device {
                device_index: 0,
                name: "GPU0".into(),
                kind: DeviceKind::Gpu,
                enabled: true,
                extra: Default::default(),
            }],
            last_heartbeat,
            current_task_id: Some(Uuid::nil()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn job(id: Uuid) -> JobExecution {
        JobExecution {
            id,
            preset_job_id: 1,
            hashlist_id: 1,
            priority: 500,
            base_keyspace: 100,
            multiplication_factor: 1,
            effective_keyspace: 100,
            processed_keyspace: 0,
            dispatched_keyspace: 50,
            overall_progress_percent: 0.0,
            uses_rule_splitting: false,
            rule_split_count: None,
            consecutive_failures: 0,
            max_agents: 0,
            is_small_job: false,
            allow_high_priority_override: false,
            status: JobExecutionStatus::Running,
            interrupted_by: None,
            created_at: Utc::now() - chrono::Duration::seconds(600),
            updated_at: Utc::now(),
        }
    }

    fn stale_task(job_id: Uuid, agent_id: i64) -> JobTask {
        let old = Utc::now() - chrono::Duration::seconds(300);
        JobTask {
            id: Uuid::new_v4(),
            job_execution_id: job_id,
            agent_id: Some(agent_id),
            chunk_number: 1,
            keyspace_start: 0,
            keyspace_end: 50,
            keyspace_processed: 10,
            effective_keyspace_start: 0,
            effective_keyspace_end: 50,
            effective_keyspace_processed: 10,
            is_actual_keyspace: false,
            chunk_actual_keyspace: None,
            is_rule_split_task: false,
            rule_start_index: None,
            rule_end_index: None,
            rule_chunk_path: None,
            status: JobTaskStatus::Running,
            detailed_status: JobTaskDetailedStatus::Running,
            priority: 500,
            attack_cmd: None,
            benchmark_speed: Some(100.0),
            average_speed: None,
            chunk_duration_seconds: 600,
            crack_count: 0,
            retry_count: 0,
            error_message: None,
            progress_percent: 20.0,
            created_at: old,
            assigned_at: Some(old),
            started_at: Some(old),
            last_checkpoint: Some(old),
            completed_at: None,
            updated_at: old,
        }
    }

    fn harness() -> (Arc<MockJobStore>, Arc<MockAgentStore>, Arc<TaskLifecycle>, EventBus) {
        let jobs = Arc::new(MockJobStore::default());
        let agents = Arc::new(MockAgentStore::default());
        let hashlists = Arc::new(MockHashlistStore::default());
        let events = EventBus::new();
        let lifecycle = Arc::new(TaskLifecycle::new(
            jobs.clone(),
            agents.clone(),
            hashlists,
            events.clone(),
            Arc::new(crate::potfile::PotfileWriter::new(std::env::temp_dir().join("kh-test-potfiles"))),
            5,
        ));
        (jobs, agents, lifecycle, events)
    }

    #[tokio::test]
    async fn dead_agent_stale_task_is_reset_for_retry() {
        let (jobs, agents, lifecycle, events) = harness();
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id));
        agents.seed_agent(agent(1, None));
        let task = stale_task(job_id, 1);
        let task_id = task.id;
        jobs.seed_task(task);

        let monitor = StaleTaskMonitor::new(
            jobs.clone(),
            agents,
            lifecycle,
            events,
            chrono::Duration::seconds(120),
            chrono::Duration::seconds(90),
        );
        let summary = monitor.sweep(Utc::now()).await.unwrap();
        assert_eq!(summary.reset_task_ids, vec![task_id]);

        let task = jobs.task(task_id);
        assert_eq!(task.status, JobTaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn alive_agent_is_repinged_not_reset() {
        let (jobs, agents, lifecycle, events) = harness();
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id));
        agents.seed_agent(agent(1, Some(Utc::now())));
        let task = stale_task(job_id, 1);
        let task_id = task.id;
        jobs.seed_task(task);

        let monitor = StaleTaskMonitor::new(
            jobs.clone(),
            agents,
            lifecycle,
            events,
            chrono::Duration::seconds(120),
            chrono::Duration::seconds(90),
        );
        let summary = monitor.sweep(Utc::now()).await.unwrap();
        assert!(summary.reset_task_ids.is_empty());
        assert_eq!(summary.reping_task_ids, vec![task_id]);

        let task = jobs.task(task_id);
        assert_eq!(task.status, JobTaskStatus::Running);
    }

    #[tokio::test]
    async fn dead_agent_holding_last_chunk_of_fully_dispatched_job_is_still_reset() {
        let (jobs, agents, lifecycle, events) = harness();
        let job_id = Uuid::new_v4();
        let mut fully_dispatched = job(job_id);
        fully_dispatched.dispatched_keyspace = fully_dispatched.effective_keyspace;
        jobs.seed_job(fully_dispatched);
        agents.seed_agent(agent(1, None));
        let task = stale_task(job_id, 1);
        let task_id = task.id;
        jobs.seed_task(task);

        let monitor = StaleTaskMonitor::new(
            jobs.clone(),
            agents,
            lifecycle,
            events,
            chrono::Duration::seconds(120),
            chrono::Duration::seconds(90),
        );
        let summary = monitor.sweep(Utc::now()).await.unwrap();
        assert_eq!(summary.reset_task_ids, vec![task_id]);

        let task = jobs.task(task_id);
        assert_eq!(task.status, JobTaskStatus::Pending);
    }

    #[tokio::test]
    async fn task_updated_within_cycle_is_left_alone() {
        let (jobs, agents, lifecycle, events) = harness();
        let job_id = Uuid::new_v4();
        jobs.seed_job(job(job_id));
        agents.seed_agent(agent(1, None));
        let mut task = stale_task(job_id, 1);
        task.updated_at = Utc::now();
        let task_id = task.id;
        jobs.seed_task(task);

        let monitor = StaleTaskMonitor::new(
            jobs.clone(),
            agents,
            lifecycle,
            events,
            chrono::Duration::seconds(120),
            chrono::Duration::seconds(90),
        );
        let summary = monitor.sweep(Utc::now()).await.unwrap();
        assert!(summary.reset_task_ids.is_empty());
        assert!(summary.reping_task_ids.is_empty());

        let task = jobs.task(task_id);
        assert_eq!(task.status, JobTaskStatus::Running);
    }
}
