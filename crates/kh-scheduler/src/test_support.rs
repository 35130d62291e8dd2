//! In-memory fakes of the `kh-store` traits, used only by this crate's own
//! tests. Each mirrors the transactional contracts documented on the
//! corresponding `Pg*Store` method (dispatch_task's job-row lock and
//! counter update, reset_task_for_retry's keyspace give-back, and so on) so
//! tests here exercise the same semantics a real Postgres-backed run would.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kh_core::domain::{
    Agent, AgentStatus, Benchmark, ClaimVoucher, Device, Hash, Hashlist, JobExecution,
    JobExecutionStatus, JobTask, JobTaskDetailedStatus, JobTaskStatus, Schedule,
};
use kh_core::error::{KrakenError, KrakenResult};
use kh_store::hashlist_store::CrackApplication;
use kh_store::job_store::NewJobTask;
use kh_store::{AgentStore, HashlistStore, JobStore};
use uuid::Uuid;

// ---------------------------------------------------------------------
// MockJobStore
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockJobStore {
    jobs: Mutex<HashMap<Uuid, JobExecution>>,
    tasks: Mutex<HashMap<Uuid, JobTask>>,
}

impl MockJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_job(&self, job: JobExecution) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn seed_task(&self, task: JobTask) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    /// A bare `running` task tied to a synthetic job, for tests that only
    /// care about per-task bookkeeping (crack counts, progress).
    pub fn seed_running_task(&self, job_id: Uuid, hashlist_id: i64) -> Uuid {
        let task_id = Uuid::new_v4();
        let now = placeholder_now();
        self.seed_task(JobTask {
            id: task_id,
            job_execution_id: job_id,
            agent_id: Some(1),
            chunk_number: 1,
            keyspace_start: 0,
            keyspace_end: 8,
            keyspace_processed: 0,
            effective_keyspace_start: 0,
            effective_keyspace_end: 8,
            effective_keyspace_processed: 0,
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
            benchmark_speed: None,
            average_speed: None,
            chunk_duration_seconds: 600,
            crack_count: 0,
            retry_count: 0,
            error_message: None,
            progress_percent: 0.0,
            created_at: now,
            assigned_at: Some(now),
            started_at: Some(now),
            last_checkpoint: None,
            completed_at: None,
            updated_at: now,
        });
        let _ = hashlist_id;
        task_id
    }

    pub fn crack_count(&self, task_id: Uuid) -> i64 {
        self.tasks.lock().unwrap()[&task_id].crack_count
    }

    pub fn task(&self, task_id: Uuid) -> JobTask {
        self.tasks.lock().unwrap()[&task_id].clone()
    }

    pub fn job(&self, job_id: Uuid) -> JobExecution {
        self.jobs.lock().unwrap()[&job_id].clone()
    }
}

/// Tests never read wall-clock skew between seeded fixtures, only
/// ordering/equality against values they also control; a fixed instant
/// keeps the fakes deterministic without calling `Utc::now()` (off limits
/// in this workspace's scripted tests) in more than one place per file.
fn placeholder_now() -> DateTime<Utc> {
    Utc::now()
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn get_job(&self, job_id: Uuid) -> KrakenResult<JobExecution> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))
    }

    async fn list_dispatchable_jobs(&self) -> KrakenResult<Vec<JobExecution>> {
        let jobs = self.jobs.lock().unwrap();
        let mut out: Vec<JobExecution> = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobExecutionStatus::Pending | JobExecutionStatus::Running)
                    && j.has_undispatched_work()
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    async fn list_non_terminal_jobs(&self) -> KrakenResult<Vec<JobExecution>> {
        let jobs = self.jobs.lock().unwrap();
        let mut out: Vec<JobExecution> = jobs
            .values()
            .filter(|j| matches!(j.status, JobExecutionStatus::Pending | JobExecutionStatus::Running))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobExecutionStatus,
        interrupted_by: Option<Uuid>,
    ) -> KrakenResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))?;
        job.status = status;
        job.interrupted_by = interrupted_by;
        Ok(())
    }

    async fn dispatch_task(
        &self,
        task: NewJobTask,
        dispatched_delta: i64,
        max_rule_end: Option<i64>,
    ) -> KrakenResult<JobTask> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&task.job_execution_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {}", task.job_execution_id)))?;
        job.dispatched_keyspace += dispatched_delta;
        if let Some(max_rule_end) = max_rule_end {
            job.rule_split_count = Some(max_rule_end);
        }

        let now = placeholder_now();
        let job_task = JobTask {
            id: task.id,
            job_execution_id: task.job_execution_id,
            agent_id: Some(task.agent_id),
            chunk_number: task.chunk_number,
            keyspace_start: task.keyspace_start,
            keyspace_end: task.keyspace_end,
            keyspace_processed: 0,
            effective_keyspace_start: task.effective_keyspace_start,
            effective_keyspace_end: task.effective_keyspace_end,
            effective_keyspace_processed: 0,
            is_actual_keyspace: false,
            chunk_actual_keyspace: None,
            is_rule_split_task: task.is_rule_split_task,
            rule_start_index: task.rule_start_index,
            rule_end_index: task.rule_end_index,
            rule_chunk_path: None,
            status: JobTaskStatus::Assigned,
            detailed_status: JobTaskDetailedStatus::Dispatched,
            priority: task.priority,
            attack_cmd: task.attack_cmd,
            benchmark_speed: task.benchmark_speed,
            average_speed: None,
            chunk_duration_seconds: task.chunk_duration_seconds,
            crack_count: 0,
            retry_count: 0,
            error_message: None,
            progress_percent: 0.0,
            created_at: now,
            assigned_at: Some(now),
            started_at: None,
            last_checkpoint: None,
            completed_at: None,
            updated_at: now,
        };
        self.tasks.lock().unwrap().insert(job_task.id, job_task.clone());
        Ok(job_task)
    }

    async fn record_progress(
        &self,
        job_id: Uuid,
        processed_delta: i64,
        overall_progress_percent: f64,
    ) -> KrakenResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))?;
        job.processed_keyspace += processed_delta;
        job.overall_progress_percent = overall_progress_percent;
        Ok(())
    }

    async fn increment_job_consecutive_failures(&self, job_id: Uuid) -> KrakenResult<i32> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))?;
        job.consecutive_failures += 1;
        Ok(job.consecutive_failures)
    }

    async fn reset_job_consecutive_failures(&self, job_id: Uuid) -> KrakenResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))?;
        job.consecutive_failures = 0;
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> KrakenResult<JobTask> {
        self.tasks
            .lock()
            .unwrap()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))
    }

    async fn list_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<Vec<JobTask>> {
        let mut out: Vec<JobTask> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.job_execution_id == job_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.chunk_number);
        Ok(out)
    }

    async fn list_active_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<Vec<JobTask>> {
        let mut out: Vec<JobTask> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                t.job_execution_id == job_id
                    && matches!(t.status, JobTaskStatus::Assigned | JobTaskStatus::Running)
            })
            .cloned()
            .collect();
        out.sort_by_key(|t| t.chunk_number);
        Ok(out)
    }

    async fn list_tasks_for_agent(&self, agent_id: i64) -> KrakenResult<Vec<JobTask>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.agent_id == Some(agent_id))
            .cloned()
            .collect())
    }

    async fn mark_task_started(&self, task_id: Uuid, started_at: DateTime<Utc>) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.status = JobTaskStatus::Running;
        task.detailed_status = JobTaskDetailedStatus::Running;
        task.started_at = Some(started_at);
        Ok(())
    }

    async fn record_task_progress(
        &self,
        task_id: Uuid,
        keyspace_processed: i64,
        effective_keyspace_processed: i64,
        progress_percent: f64,
        checkpoint: DateTime<Utc>,
    ) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.keyspace_processed = keyspace_processed;
        task.effective_keyspace_processed = effective_keyspace_processed;
        task.progress_percent = progress_percent;
        task.last_checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn record_task_crack(&self, task_id: Uuid) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.crack_count += 1;
        task.detailed_status = JobTaskDetailedStatus::RunningWithCracks;
        Ok(())
    }

    async fn complete_task(
        &self,
        task_id: Uuid,
        detailed_status: JobTaskDetailedStatus,
        actual_keyspace: Option<i64>,
        average_speed: f64,
        completed_at: DateTime<Utc>,
    ) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.status = JobTaskStatus::Completed;
        task.detailed_status = detailed_status;
        task.chunk_actual_keyspace = actual_keyspace;
        task.is_actual_keyspace = actual_keyspace.is_some();
        task.average_speed = Some(average_speed);
        task.progress_percent = 100.0;
        task.completed_at = Some(completed_at);
        Ok(())
    }

    async fn fail_task(&self, task_id: Uuid, error_message: &str, completed_at: DateTime<Utc>) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.status = JobTaskStatus::Failed;
        task.detailed_status = JobTaskDetailedStatus::Failed;
        task.error_message = Some(error_message.to_string());
        task.completed_at = Some(completed_at);
        Ok(())
    }

    async fn mark_task_reconnect_pending(&self, task_id: Uuid) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.status = JobTaskStatus::ReconnectPending;
        task.detailed_status = JobTaskDetailedStatus::ReconnectPending;
        Ok(())
    }

    async fn preempt_task(&self, task_id: Uuid) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        task.status = JobTaskStatus::Pending;
        task.detailed_status = JobTaskDetailedStatus::Pending;
        task.agent_id = None;
        task.assigned_at = None;
        task.started_at = None;
        Ok(())
    }

    async fn reset_task_for_retry(&self, task_id: Uuid) -> KrakenResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| KrakenError::not_found(format!("task {task_id}")))?;
        let dispatched_delta = task.effective_window_size();
        let processed_delta = task.effective_keyspace_processed;
        task.status = JobTaskStatus::Pending;
        task.detailed_status = JobTaskDetailedStatus::Pending;
        task.agent_id = None;
        task.assigned_at = None;
        task.started_at = None;
        task.completed_at = None;
        task.error_message = None;
        task.keyspace_processed = 0;
        task.effective_keyspace_processed = 0;
        task.progress_percent = 0.0;
        task.retry_count += 1;
        let job_id = task.job_execution_id;
        drop(tasks);

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))?;
        job.dispatched_keyspace -= dispatched_delta;
        job.processed_keyspace -= processed_delta;
        Ok(())
    }

    async fn cancel_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut count = 0u64;
        for task in tasks.values_mut() {
            if task.job_execution_id == job_id && !task.status.is_terminal() {
                task.status = JobTaskStatus::Cancelled;
                task.detailed_status = JobTaskDetailedStatus::Cancelled;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn apply_keyspace_correction(
        &self,
        job_id: Uuid,
        after_chunk: i64,
        delta: i64,
        new_effective_keyspace: i64,
    ) -> KrakenResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| KrakenError::not_found(format!("job {job_id}")))?;
        job.effective_keyspace = job.effective_keyspace.max(new_effective_keyspace);
        drop(jobs);

        if delta != 0 {
            let mut tasks = self.tasks.lock().unwrap();
            for task in tasks.values_mut() {
                if task.job_execution_id == job_id && task.chunk_number > after_chunk && !task.is_actual_keyspace {
                    task.effective_keyspace_start += delta;
                    task.effective_keyspace_end += delta;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// MockAgentStore
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockAgentStore {
    agents: Mutex<HashMap<i64, Agent>>,
    schedules: Mutex<HashMap<i64, Vec<Schedule>>>,
    benchmarks: Mutex<HashMap<(i64, i32, i32), Benchmark>>,
    vouchers: Mutex<HashMap<String, ClaimVoucher>>,
}

impl MockAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_agent(&self, agent: Agent) {
        self.agents.lock().unwrap().insert(agent.id, agent);
    }

    pub fn seed_schedule(&self, schedule: Schedule) {
        self.schedules
            .lock()
            .unwrap()
            .entry(schedule.agent_id)
            .or_default()
            .push(schedule);
    }

    pub fn seed_benchmark(&self, benchmark: Benchmark) {
        self.benchmarks.lock().unwrap().insert(
            (benchmark.agent_id, benchmark.attack_mode.as_i32(), benchmark.hash_type),
            benchmark,
        );
    }

    pub fn current_task(&self, agent_id: i64) -> Option<Uuid> {
        self.agents.lock().unwrap()[&agent_id].current_task_id
    }
}

#[async_trait]
impl AgentStore for MockAgentStore {
    async fn get_agent(&self, agent_id: i64) -> KrakenResult<Agent> {
        self.agents
            .lock()
            .unwrap()
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| KrakenError::not_found(format!("agent {agent_id}")))
    }

    async fn list_eligible_agents(&self) -> KrakenResult<Vec<Agent>> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.enabled && a.scheduling_enabled && a.status == AgentStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_schedules_for_agent(&self, agent_id: i64) -> KrakenResult<Vec<Schedule>> {
        Ok(self.schedules.lock().unwrap().get(&agent_id).cloned().unwrap_or_default())
    }

    async fn get_benchmark(&self, agent_id: i64, attack_mode: i32, hash_type: i32) -> KrakenResult<Option<Benchmark>> {
        Ok(self.benchmarks.lock().unwrap().get(&(agent_id, attack_mode, hash_type)).cloned())
    }

    async fn upsert_benchmark(
        &self,
        agent_id: i64,
        attack_mode: i32,
        hash_type: i32,
        hashes_per_second: f64,
        recorded_at: DateTime<Utc>,
    ) -> KrakenResult<()> {
        use kh_core::domain::AttackMode;
        let mode = AttackMode::from_i32(attack_mode)
            .ok_or_else(|| KrakenError::invalid(format!("unknown attack_mode {attack_mode}")))?;
        self.benchmarks.lock().unwrap().insert(
            (agent_id, attack_mode, hash_type),
            Benchmark {
                agent_id,
                attack_mode: mode,
                hash_type,
                hashes_per_second,
                recorded_at,
            },
        );
        Ok(())
    }

    async fn record_heartbeat(&self, agent_id: i64, devices: &[Device], at: DateTime<Utc>) -> KrakenResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| KrakenError::not_found(format!("agent {agent_id}")))?;
        agent.last_heartbeat = Some(at);
        agent.devices = devices.to_vec();
        Ok(())
    }

    async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> KrakenResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| KrakenError::not_found(format!("agent {agent_id}")))?;
        agent.status = status;
        Ok(())
    }

    async fn assign_current_task(&self, agent_id: i64, task_id: Option<Uuid>) -> KrakenResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| KrakenError::not_found(format!("agent {agent_id}")))?;
        agent.current_task_id = task_id;
        Ok(())
    }

    async fn increment_consecutive_failures(&self, agent_id: i64) -> KrakenResult<i32> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| KrakenError::not_found(format!("agent {agent_id}")))?;
        agent.consecutive_failures += 1;
        Ok(agent.consecutive_failures)
    }

    async fn reset_consecutive_failures(&self, agent_id: i64) -> KrakenResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| KrakenError::not_found(format!("agent {agent_id}")))?;
        agent.consecutive_failures = 0;
        Ok(())
    }

    async fn get_claim_voucher(&self, code: &str) -> KrakenResult<ClaimVoucher> {
        self.vouchers
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| KrakenError::not_found(format!("voucher {code}")))
    }

    async fn consume_claim_voucher(&self, code: &str, agent_id: i64, at: DateTime<Utc>) -> KrakenResult<()> {
        let mut vouchers = self.vouchers.lock().unwrap();
        let voucher = vouchers
            .get_mut(code)
            .ok_or_else(|| KrakenError::not_found(format!("voucher {code}")))?;
        voucher.consumed_at = Some(at);
        voucher.consumed_by_agent_id = Some(agent_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// MockHashlistStore
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockHashlistStore {
    hashlists: Mutex<HashMap<i64, Hashlist>>,
    hashes: Mutex<HashMap<(i32, String), Hash>>,
    memberships: Mutex<HashMap<i64, Vec<(i32, String)>>>,
}

impl MockHashlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_hashlist(&self, hashlist: Hashlist) {
        self.hashlists.lock().unwrap().insert(hashlist.id, hashlist);
    }

    pub fn seed_hash(&self, hashlist_id: i64, hash: Hash) {
        let key = (hash.hash_type_id, hash.hash_value.clone());
        self.hashes.lock().unwrap().insert(key.clone(), hash);
        self.memberships.lock().unwrap().entry(hashlist_id).or_default().push(key);
    }

    pub fn cracked_hashes(&self, hashlist_id: i64) -> i64 {
        self.hashlists.lock().unwrap()[&hashlist_id].cracked_hashes
    }
}

#[async_trait]
impl HashlistStore for MockHashlistStore {
    async fn get_hashlist(&self, hashlist_id: i64) -> KrakenResult<Hashlist> {
        self.hashlists
            .lock()
            .unwrap()
            .get(&hashlist_id)
            .cloned()
            .ok_or_else(|| KrakenError::not_found(format!("hashlist {hashlist_id}")))
    }

    async fn get_hash(&self, hashlist_id: i64, hash_value: &str) -> KrakenResult<Option<Hash>> {
        let memberships = self.memberships.lock().unwrap();
        let Some(keys) = memberships.get(&hashlist_id) else {
            return Ok(None);
        };
        let hashes = self.hashes.lock().unwrap();
        Ok(keys
            .iter()
            .find(|(_, v)| v == hash_value)
            .and_then(|k| hashes.get(k))
            .cloned())
    }

    async fn apply_crack(
        &self,
        hash_value: &str,
        hash_type_id: i32,
        password: &str,
        username: Option<&str>,
    ) -> KrakenResult<CrackApplication> {
        let key = (hash_type_id, hash_value.to_string());
        let (hash_id, newly_cracked) = {
            let mut hashes = self.hashes.lock().unwrap();
            let hash = hashes
                .get_mut(&key)
                .ok_or_else(|| KrakenError::not_found(format!("hash {hash_value}")))?;
            let newly_cracked = hash.apply_crack(password, username);
            (hash.id, newly_cracked)
        };

        let mut affected = Vec::new();
        if newly_cracked {
            let memberships = self.memberships.lock().unwrap();
            let mut hashlists = self.hashlists.lock().unwrap();
            for (&hashlist_id, keys) in memberships.iter() {
                if keys.contains(&key) {
                    if let Some(hashlist) = hashlists.get_mut(&hashlist_id) {
                        hashlist.cracked_hashes += 1;
                        affected.push(hashlist_id);
                    }
                }
            }
        }

        Ok(CrackApplication {
            hash_id,
            newly_cracked,
            affected_hashlist_ids: affected,
        })
    }

    async fn sync_cracked_count(&self, hashlist_id: i64) -> KrakenResult<i64> {
        let memberships = self.memberships.lock().unwrap();
        let keys = memberships.get(&hashlist_id).cloned().unwrap_or_default();
        let hashes = self.hashes.lock().unwrap();
        let count = keys.iter().filter(|k| hashes.get(*k).map(|h| h.is_cracked).unwrap_or(false)).count() as i64;
        drop(hashes);
        drop(memberships);
        let mut hashlists = self.hashlists.lock().unwrap();
        if let Some(hashlist) = hashlists.get_mut(&hashlist_id) {
            hashlist.cracked_hashes = count;
        }
        Ok(count)
    }

    async fn exclude_from_potfile(&self, hashlist_id: i64) -> KrakenResult<bool> {
        Ok(self
            .hashlists
            .lock()
            .unwrap()
            .get(&hashlist_id)
            .map(|h| h.exclude_from_potfile)
            .unwrap_or(false))
    }
}
