//! Scheduler Loop (§4.3): the single authoritative work-dispatcher. Ties
//! together agent eligibility (§4.8, [`crate::agent_gate`]), chunk sizing
//! (`kh-keyspace::ChunkSizer`), and task dispatch
//! ([`crate::task_lifecycle::TaskLifecycle::assign`]).
//!
//! What `attack_mode`/`hash_type`/`chunk_duration_seconds` a job dispatches
//! with comes from its `PresetJob`/`Hashlist`, which this crate does not
//! own a store trait for; callers resolve that once per tick and pass it
//! in as [`JobDispatchInfo`] so this module stays testable against the
//! job/task stores alone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kh_core::domain::{Agent, AttackMode, JobExecution, JobExecutionStatus};
use kh_core::error::KrakenResult;
use kh_keyspace::{ChunkRange, ChunkSizer, ChunkSizerError, ChunkSizerInput};
use kh_store::job_store::NewJobTask;
use kh_store::{AgentStore, JobStore};
use kh_telemetry::{DomainEvent, EventBus};
use uuid::Uuid;

use crate::agent_gate::agent_is_eligible;
use crate::task_lifecycle::TaskLifecycle;

/// Everything about a job's attack that isn't itself part of
/// `JobExecution` but that the Chunk Sizer and benchmark lookup need.
#[derive(Debug, Clone, Copy)]
pub struct JobDispatchInfo {
    pub attack_mode: AttackMode,
    pub hash_type: i32,
    pub chunk_duration_seconds: u64,
    pub total_rule_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub dispatched_task_ids: Vec<Uuid>,
    pub preempted_job_ids: Vec<Uuid>,
}

pub struct SchedulerLoop {
    jobs: Arc<dyn JobStore>,
    agents: Arc<dyn AgentStore>,
    lifecycle: Arc<TaskLifecycle>,
    events: EventBus,
    heartbeat_timeout: chrono::Duration,
    max_chunk_size: u64,
}

impl SchedulerLoop {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        agents: Arc<dyn AgentStore>,
        lifecycle: Arc<TaskLifecycle>,
        events: EventBus,
        heartbeat_timeout: chrono::Duration,
        max_chunk_size: u64,
    ) -> Self {
        Self {
            jobs,
            agents,
            lifecycle,
            events,
            heartbeat_timeout,
            max_chunk_size,
        }
    }

    /// One full tick (§4.3 steps 1-6). `dispatch_info` must carry an entry
    /// for every job that should be considered for dispatch this tick;
    /// jobs with no entry are skipped (as if still waiting on file sync).
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        dispatch_info: &HashMap<Uuid, JobDispatchInfo>,
    ) -> KrakenResult<TickSummary> {
        let mut summary = TickSummary::default();

        // Step 1: snapshot pending work, already ordered priority DESC,
        // created_at ASC by the store.
        let candidate_jobs = self.jobs.list_dispatchable_jobs().await?;

        // Step 3: build the free-agent pool.
        let mut free_agents = self.eligible_free_agents(now).await?;

        // Step 2: preemption. Only jobs still `pending` can trigger it;
        // running jobs are already dispatched.
        for job in candidate_jobs.iter().filter(|j| j.status == JobExecutionStatus::Pending) {
            if !job.allow_high_priority_override || !free_agents.is_empty() {
                continue;
            }
            if let Some(victim_id) = self.try_preempt(job, &candidate_jobs, now, &mut free_agents).await? {
                summary.preempted_job_ids.push(victim_id);
            }
        }

        // Steps 4-6: match jobs to agents in priority order.
        for job in &candidate_jobs {
            if free_agents.is_empty() {
                break;
            }
            let Some(info) = dispatch_info.get(&job.id) else {
                continue;
            };
            self.dispatch_job(job, *info, &mut free_agents, &mut summary).await?;
        }

        Ok(summary)
    }

    async fn eligible_free_agents(&self, now: DateTime<Utc>) -> KrakenResult<Vec<Agent>> {
        let mut out = Vec::new();
        for agent in self.agents.list_eligible_agents().await? {
            let schedules = self.agents.list_schedules_for_agent(agent.id).await?;
            if agent_is_eligible(&agent, &schedules, now, self.heartbeat_timeout) {
                out.push(agent);
            }
        }
        Ok(out)
    }

    /// Finds the lowest-priority running job below `job`'s priority and
    /// detaches its active tasks back to `pending`, returning the freed
    /// agents to the pool. One victim per displacing job per tick.
    async fn try_preempt(
        &self,
        job: &JobExecution,
        candidates: &[JobExecution],
        now: DateTime<Utc>,
        free_agents: &mut Vec<Agent>,
    ) -> KrakenResult<Option<Uuid>> {
        let mut running: Vec<&JobExecution> = candidates
            .iter()
            .filter(|r| r.status == JobExecutionStatus::Running && r.priority < job.priority)
            .collect();
        running.sort_by_key(|r| r.priority);
        let Some(victim) = running.first() else {
            return Ok(None);
        };

        let active_tasks = self.jobs.list_active_tasks_for_job(victim.id).await?;
        if active_tasks.is_empty() {
            return Ok(None);
        }

        for task in &active_tasks {
            self.jobs.preempt_task(task.id).await?;
            if let Some(agent_id) = task.agent_id {
                self.agents.assign_current_task(agent_id, None).await?;
                if let Ok(agent) = self.agents.get_agent(agent_id).await {
                    let schedules = self.agents.list_schedules_for_agent(agent_id).await?;
                    if agent_is_eligible(&agent, &schedules, now, self.heartbeat_timeout) {
                        free_agents.push(agent);
                    }
                }
            }
        }

        self.jobs
            .update_job_status(victim.id, JobExecutionStatus::Pending, Some(job.id))
            .await?;
        self.events.publish(DomainEvent::JobPreempted {
            job_id: victim.id,
            preempted_by: job.id,
            at: now,
        });
        Ok(Some(victim.id))
    }

    async fn dispatch_job(
        &self,
        job: &JobExecution,
        info: JobDispatchInfo,
        free_agents: &mut Vec<Agent>,
        summary: &mut TickSummary,
    ) -> KrakenResult<()> {
        let cap = job.agent_cap();
        let active_tasks = self.jobs.list_active_tasks_for_job(job.id).await?;
        let mut active_agents: std::collections::HashSet<i64> =
            active_tasks.iter().filter_map(|t| t.agent_id).collect();

        let mut existing_chunk_count = self.jobs.list_tasks_for_job(job.id).await?.len() as i64;
        let mut max_rule_end = job.rule_split_count.unwrap_or(0);

        loop {
            if let Some(cap) = cap {
                if active_agents.len() as u32 >= cap {
                    break;
                }
            }
            if free_agents.is_empty() {
                break;
            }

            // Prefer the fastest benchmarked agent for this attack/hash.
            let mut best: Option<(usize, f64)> = None;
            for (idx, agent) in free_agents.iter().enumerate() {
                if let Some(bench) = self
                    .agents
                    .get_benchmark(agent.id, info.attack_mode.as_i32(), info.hash_type)
                    .await?
                {
                    if best.map(|(_, speed)| bench.hashes_per_second > speed).unwrap_or(true) {
                        best = Some((idx, bench.hashes_per_second));
                    }
                }
            }
            let Some((idx, speed)) = best else {
                // No free agent has a benchmark yet; nothing to dispatch
                // this tick (a real daemon would send benchmark_request).
                break;
            };

            let input = ChunkSizerInput {
                benchmark_speed: Some(speed),
                chunk_duration_seconds: info.chunk_duration_seconds as f64,
                max_chunk_size: self.max_chunk_size,
                effective_keyspace: job.effective_keyspace,
                dispatched_keyspace: job.dispatched_keyspace,
                uses_rule_splitting: job.uses_rule_splitting,
                base_keyspace: job.base_keyspace,
                max_rule_end,
                total_rule_count: info.total_rule_count,
                next_chunk_number: existing_chunk_count + 1,
            };

            let next = match ChunkSizer::next_chunk(&input) {
                Ok(next) => next,
                Err(ChunkSizerError::NoWorkRemaining) => break,
                Err(ChunkSizerError::NeedsBenchmark) => break,
            };

            let agent = free_agents.remove(idx);
            let (keyspace_start, keyspace_end, effective_start, effective_end, is_rule_split, rule_start, rule_end) =
                match next.range {
                    ChunkRange::Keyspace { start, end } => (start, end, start, end, false, None, None),
                    ChunkRange::RuleSplit {
                        rule_start,
                        rule_end,
                        effective_start,
                        effective_end,
                    } => (rule_start, rule_end, effective_start, effective_end, true, Some(rule_start), Some(rule_end)),
                };

            let dispatched_delta = effective_end - effective_start;
            let new_max_rule_end = rule_end.map(|e| e.max(max_rule_end));

            let new_task = NewJobTask {
                id: Uuid::new_v4(),
                job_execution_id: job.id,
                agent_id: agent.id,
                chunk_number: next.chunk_number,
                keyspace_start,
                keyspace_end,
                effective_keyspace_start: effective_start,
                effective_keyspace_end: effective_end,
                is_rule_split_task: is_rule_split,
                rule_start_index: rule_start,
                rule_end_index: rule_end,
                priority: job.priority,
                attack_cmd: None,
                benchmark_speed: Some(speed),
                chunk_duration_seconds: info.chunk_duration_seconds,
            };

            let dispatched = self.lifecycle.assign(new_task, dispatched_delta, new_max_rule_end).await?;
            summary.dispatched_task_ids.push(dispatched.id);
            active_agents.insert(agent.id);
            existing_chunk_count += 1;
            if let Some(e) = new_max_rule_end {
                max_rule_end = e;
            }
            if job.status == JobExecutionStatus::Pending {
                self.jobs.update_job_status(job.id, JobExecutionStatus::Running, None).await?;
            }
        }
        Ok(())
    }
}
