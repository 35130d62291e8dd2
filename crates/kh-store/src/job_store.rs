use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kh_core::domain::{JobExecution, JobExecutionStatus, JobTask, JobTaskDetailedStatus, JobTaskStatus};
use kh_core::error::KrakenResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::map_sqlx_error;
use crate::models::{detailed_status_to_db, JobExecutionRow, JobExecutionStatusRow, JobTaskRow, JobTaskStatusRow};

/// What a fresh task needs at creation time; mirrors the fields the
/// Scheduler Loop/`ChunkSizer` combination produces for one dispatch.
#[derive(Debug, Clone)]
pub struct NewJobTask {
    pub id: Uuid,
    pub job_execution_id: Uuid,
    pub agent_id: i64,
    pub chunk_number: i64,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub effective_keyspace_start: i64,
    pub effective_keyspace_end: i64,
    pub is_rule_split_task: bool,
    pub rule_start_index: Option<i64>,
    pub rule_end_index: Option<i64>,
    pub priority: i32,
    pub attack_cmd: Option<String>,
    pub benchmark_speed: Option<f64>,
    pub chunk_duration_seconds: u64,
}

/// Persistence boundary for jobs and tasks. One trait per aggregate keeps
/// the scheduler's business logic testable against an in-memory fake
/// without a database (see `kh-scheduler`'s mock store).
///
/// Every method that mutates a job's counters or tasks locks that job's
/// row with `SELECT ... FOR UPDATE` for the duration of its own
/// transaction, serializing concurrent dispatch/progress/completion calls
/// against the same job to one writer at a time. `dispatch_task` is the
/// one place two tables (`job_executions` and `job_tasks`) must move
/// together, so it takes the lock itself rather than composing two
/// separately-locked calls.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: Uuid) -> KrakenResult<JobExecution>;

    /// Jobs with undispatched keyspace remaining, ordered by priority
    /// (descending) then creation time (ascending) — the Scheduler Loop's
    /// candidate order.
    async fn list_dispatchable_jobs(&self) -> KrakenResult<Vec<JobExecution>>;

    /// Every `pending`/`running` job regardless of dispatched keyspace —
    /// used by the Stale-Task Monitor, which must still find a dead agent
    /// holding the last chunk of a job that has already dispatched its
    /// entire keyspace (and so has dropped out of `list_dispatchable_jobs`).
    async fn list_non_terminal_jobs(&self) -> KrakenResult<Vec<JobExecution>>;

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobExecutionStatus,
        interrupted_by: Option<Uuid>,
    ) -> KrakenResult<()>;

    /// Locks the job row, inserts the new task, and advances
    /// `dispatched_keyspace` (and, for rule-split jobs, `rule_split_count`)
    /// in one transaction.
    async fn dispatch_task(
        &self,
        task: NewJobTask,
        dispatched_delta: i64,
        max_rule_end: Option<i64>,
    ) -> KrakenResult<JobTask>;

    async fn record_progress(
        &self,
        job_id: Uuid,
        processed_delta: i64,
        overall_progress_percent: f64,
    ) -> KrakenResult<()>;

    async fn increment_job_consecutive_failures(&self, job_id: Uuid) -> KrakenResult<i32>;
    async fn reset_job_consecutive_failures(&self, job_id: Uuid) -> KrakenResult<()>;

    async fn get_task(&self, task_id: Uuid) -> KrakenResult<JobTask>;
    async fn list_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<Vec<JobTask>>;

    /// Tasks currently `assigned` or `running`, used by the stale-task
    /// monitor and by overlap checks before dispatching new work.
    async fn list_active_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<Vec<JobTask>>;

    async fn list_tasks_for_agent(&self, agent_id: i64) -> KrakenResult<Vec<JobTask>>;

    async fn mark_task_started(&self, task_id: Uuid, started_at: DateTime<Utc>) -> KrakenResult<()>;

    async fn record_task_progress(
        &self,
        task_id: Uuid,
        keyspace_processed: i64,
        effective_keyspace_processed: i64,
        progress_percent: f64,
        checkpoint: DateTime<Utc>,
    ) -> KrakenResult<()>;

    async fn record_task_crack(&self, task_id: Uuid) -> KrakenResult<()>;

    async fn complete_task(
        &self,
        task_id: Uuid,
        detailed_status: JobTaskDetailedStatus,
        actual_keyspace: Option<i64>,
        average_speed: f64,
        completed_at: DateTime<Utc>,
    ) -> KrakenResult<()>;

    async fn fail_task(
        &self,
        task_id: Uuid,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> KrakenResult<()>;

    async fn mark_task_reconnect_pending(&self, task_id: Uuid) -> KrakenResult<()>;

    /// Detaches a running/assigned task back to `pending` for preemption
    /// (§4.3 step 2): unlike [`Self::reset_task_for_retry`], the
    /// accumulated `keyspace_processed`/`effective_keyspace_processed` and
    /// the job's `dispatched_keyspace` are left untouched, since the work
    /// already done is not re-done when the job resumes.
    async fn preempt_task(&self, task_id: Uuid) -> KrakenResult<()>;

    /// Clears `agent_id`/timestamps and returns the task to `pending` for a
    /// fresh assignment — used for both the retry path and reconnect
    /// recovery.
    async fn reset_task_for_retry(&self, task_id: Uuid) -> KrakenResult<()>;

    async fn cancel_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<u64>;

    /// Applies the §4.6 cascade-correction rule after a chunk reports an
    /// actual keyspace that differs from its planned size: shifts every
    /// still-provisional sibling task's effective window (tasks past
    /// `after_chunk` that haven't reported their own actual) by `delta`,
    /// and grows the job's `effective_keyspace` up to
    /// `new_effective_keyspace` if that's larger than the current value.
    async fn apply_keyspace_correction(
        &self,
        job_id: Uuid,
        after_chunk: i64,
        delta: i64,
        new_effective_keyspace: i64,
    ) -> KrakenResult<()>;
}

pub struct PgJobStore {
    pool: PgPool,
}

const TASK_COLUMNS: &str = r#"
    id, job_execution_id, agent_id, chunk_number, keyspace_start,
    keyspace_end, keyspace_processed, effective_keyspace_start,
    effective_keyspace_end, effective_keyspace_processed,
    is_actual_keyspace, chunk_actual_keyspace, is_rule_split_task,
    rule_start_index, rule_end_index, rule_chunk_path, status,
    detailed_status, priority, attack_cmd, benchmark_speed,
    average_speed, chunk_duration_seconds, crack_count, retry_count,
    error_message, progress_percent, created_at, assigned_at,
    started_at, last_checkpoint, completed_at, updated_at
"#;

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list_tasks_where(
        &self,
        job_id: Uuid,
        extra_clause: Option<&str>,
    ) -> KrakenResult<Vec<JobTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM job_tasks WHERE job_execution_id = $1 {} ORDER BY chunk_number ASC",
            extra_clause.unwrap_or("")
        );
        let rows: Vec<JobTaskRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("tasks for job {job_id}"), e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get_job(&self, job_id: Uuid) -> KrakenResult<JobExecution> {
        let row: JobExecutionRow = sqlx::query_as(
            r#"
            SELECT id, preset_job_id, hashlist_id, priority, base_keyspace,
                   multiplication_factor, effective_keyspace, processed_keyspace,
                   dispatched_keyspace, overall_progress_percent, uses_rule_splitting,
                   rule_split_count, consecutive_failures, max_agents, is_small_job,
                   allow_high_priority_override, status, interrupted_by, created_at,
                   updated_at
            FROM job_executions
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("job {job_id}"), e))?;
        Ok(row.into())
    }

    async fn list_dispatchable_jobs(&self) -> KrakenResult<Vec<JobExecution>> {
        let rows: Vec<JobExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, preset_job_id, hashlist_id, priority, base_keyspace,
                   multiplication_factor, effective_keyspace, processed_keyspace,
                   dispatched_keyspace, overall_progress_percent, uses_rule_splitting,
                   rule_split_count, consecutive_failures, max_agents, is_small_job,
                   allow_high_priority_override, status, interrupted_by, created_at,
                   updated_at
            FROM job_executions
            WHERE status IN ('pending', 'running')
              AND dispatched_keyspace < effective_keyspace
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list dispatchable jobs", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_non_terminal_jobs(&self) -> KrakenResult<Vec<JobExecution>> {
        let rows: Vec<JobExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, preset_job_id, hashlist_id, priority, base_keyspace,
                   multiplication_factor, effective_keyspace, processed_keyspace,
                   dispatched_keyspace, overall_progress_percent, uses_rule_splitting,
                   rule_split_count, consecutive_failures, max_agents, is_small_job,
                   allow_high_priority_override, status, interrupted_by, created_at,
                   updated_at
            FROM job_executions
            WHERE status IN ('pending', 'running')
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list non-terminal jobs", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobExecutionStatus,
        interrupted_by: Option<Uuid>,
    ) -> KrakenResult<()> {
        let status_row: JobExecutionStatusRow = status.into();
        sqlx::query(
            "UPDATE job_executions SET status = $2, interrupted_by = $3, updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .bind(status_row)
        .bind(interrupted_by)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("update job {job_id} status"), e))?;
        Ok(())
    }

    async fn dispatch_task(
        &self,
        task: NewJobTask,
        dispatched_delta: i64,
        max_rule_end: Option<i64>,
    ) -> KrakenResult<JobTask> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin dispatch transaction", e))?;

        sqlx::query_as::<_, (Uuid,)>("SELECT id FROM job_executions WHERE id = $1 FOR UPDATE")
            .bind(task.job_execution_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("lock job {}", task.job_execution_id), e))?;

        let status_row: JobTaskStatusRow = JobTaskStatus::Assigned.into();
        let row: JobTaskRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO job_tasks (
                id, job_execution_id, agent_id, chunk_number,
                keyspace_start, keyspace_end,
                effective_keyspace_start, effective_keyspace_end,
                is_rule_split_task, rule_start_index, rule_end_index,
                status, detailed_status, priority, attack_cmd, benchmark_speed,
                chunk_duration_seconds, assigned_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, now()
            )
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(task.job_execution_id)
        .bind(task.agent_id)
        .bind(task.chunk_number)
        .bind(task.keyspace_start)
        .bind(task.keyspace_end)
        .bind(task.effective_keyspace_start)
        .bind(task.effective_keyspace_end)
        .bind(task.is_rule_split_task)
        .bind(task.rule_start_index)
        .bind(task.rule_end_index)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::Dispatched))
        .bind(task.priority)
        .bind(task.attack_cmd)
        .bind(task.benchmark_speed)
        .bind(task.chunk_duration_seconds as i64)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert job task", e))?;

        sqlx::query(
            r#"
            UPDATE job_executions
            SET dispatched_keyspace = dispatched_keyspace + $2,
                rule_split_count = COALESCE($3, rule_split_count),
                status = 'running',
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task.job_execution_id)
        .bind(dispatched_delta)
        .bind(max_rule_end)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("record dispatch for job {}", task.job_execution_id), e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit dispatch transaction", e))?;

        row.try_into()
    }

    async fn record_progress(
        &self,
        job_id: Uuid,
        processed_delta: i64,
        overall_progress_percent: f64,
    ) -> KrakenResult<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET processed_keyspace = processed_keyspace + $2,
                overall_progress_percent = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(processed_delta)
        .bind(overall_progress_percent)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("record progress for job {job_id}"), e))?;
        Ok(())
    }

    async fn increment_job_consecutive_failures(&self, job_id: Uuid) -> KrakenResult<i32> {
        let (count,): (i32,) = sqlx::query_as(
            r#"
            UPDATE job_executions
            SET consecutive_failures = consecutive_failures + 1, updated_at = now()
            WHERE id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("increment failures for job {job_id}"), e))?;
        Ok(count)
    }

    async fn reset_job_consecutive_failures(&self, job_id: Uuid) -> KrakenResult<()> {
        sqlx::query(
            "UPDATE job_executions SET consecutive_failures = 0, updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("reset failures for job {job_id}"), e))?;
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> KrakenResult<JobTask> {
        let row: JobTaskRow = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM job_tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("task {task_id}"), e))?;
        row.try_into()
    }

    async fn list_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<Vec<JobTask>> {
        self.list_tasks_where(job_id, None).await
    }

    async fn list_active_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<Vec<JobTask>> {
        self.list_tasks_where(job_id, Some("AND status IN ('assigned', 'running')"))
            .await
    }

    async fn list_tasks_for_agent(&self, agent_id: i64) -> KrakenResult<Vec<JobTask>> {
        let rows: Vec<JobTaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM job_tasks WHERE agent_id = $1 AND status IN ('assigned', 'running', 'reconnect_pending')"
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("tasks for agent {agent_id}"), e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_task_started(&self, task_id: Uuid, started_at: DateTime<Utc>) -> KrakenResult<()> {
        let status_row: JobTaskStatusRow = JobTaskStatus::Running.into();
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = $2, detailed_status = $3, started_at = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::Running))
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mark task {task_id} started"), e))?;
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
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET keyspace_processed = $2,
                effective_keyspace_processed = $3,
                progress_percent = $4,
                last_checkpoint = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(keyspace_processed)
        .bind(effective_keyspace_processed)
        .bind(progress_percent)
        .bind(checkpoint)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("record progress for task {task_id}"), e))?;
        Ok(())
    }

    async fn record_task_crack(&self, task_id: Uuid) -> KrakenResult<()> {
        sqlx::query(
            "UPDATE job_tasks SET crack_count = crack_count + 1, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("record crack for task {task_id}"), e))?;
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
        let status_row: JobTaskStatusRow = JobTaskStatus::Completed.into();
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = $2,
                detailed_status = $3,
                chunk_actual_keyspace = $4,
                is_actual_keyspace = ($4 IS NOT NULL),
                average_speed = $5,
                progress_percent = 100.0,
                completed_at = $6,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status_row)
        .bind(detailed_status_to_db(detailed_status))
        .bind(actual_keyspace)
        .bind(average_speed)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("complete task {task_id}"), e))?;
        Ok(())
    }

    async fn fail_task(
        &self,
        task_id: Uuid,
        error_message: &str,
        completed_at: DateTime<Utc>,
    ) -> KrakenResult<()> {
        let status_row: JobTaskStatusRow = JobTaskStatus::Failed.into();
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = $2,
                detailed_status = $3,
                error_message = $4,
                completed_at = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::Failed))
        .bind(error_message)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("fail task {task_id}"), e))?;
        Ok(())
    }

    async fn mark_task_reconnect_pending(&self, task_id: Uuid) -> KrakenResult<()> {
        let status_row: JobTaskStatusRow = JobTaskStatus::ReconnectPending.into();
        sqlx::query(
            "UPDATE job_tasks SET status = $2, detailed_status = $3, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::ReconnectPending))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mark task {task_id} reconnect_pending"), e))?;
        Ok(())
    }

    async fn preempt_task(&self, task_id: Uuid) -> KrakenResult<()> {
        let status_row: JobTaskStatusRow = JobTaskStatus::Pending.into();
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = $2,
                detailed_status = $3,
                agent_id = NULL,
                assigned_at = NULL,
                started_at = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::Pending))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("preempt task {task_id}"), e))?;
        Ok(())
    }

    async fn reset_task_for_retry(&self, task_id: Uuid) -> KrakenResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin reset_task_for_retry", e))?;

        let task_row: JobTaskRow = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM job_tasks WHERE id = $1 FOR UPDATE"
        ))
        .bind(task_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("task {task_id}"), e))?;
        let task: JobTask = task_row.try_into()?;

        sqlx::query("SELECT id FROM job_executions WHERE id = $1 FOR UPDATE")
            .bind(task.job_execution_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("lock job {}", task.job_execution_id), e))?;

        // Return the reserved keyspace and accumulated progress to the job
        // so a re-dispatch picks the work back up from scratch (§4.4
        // reset_for_retry).
        let dispatched_delta = task.effective_window_size();
        let processed_delta = task.effective_keyspace_processed;
        sqlx::query(
            r#"
            UPDATE job_executions
            SET dispatched_keyspace = dispatched_keyspace - $2,
                processed_keyspace = processed_keyspace - $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task.job_execution_id)
        .bind(dispatched_delta)
        .bind(processed_delta)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("return keyspace for job {}", task.job_execution_id), e))?;

        let status_row: JobTaskStatusRow = JobTaskStatus::Pending.into();
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = $2,
                detailed_status = $3,
                agent_id = NULL,
                assigned_at = NULL,
                started_at = NULL,
                completed_at = NULL,
                error_message = NULL,
                keyspace_processed = 0,
                effective_keyspace_processed = 0,
                progress_percent = 0.0,
                retry_count = retry_count + 1,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::Pending))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("reset task {task_id} for retry"), e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit reset_task_for_retry", e))?;
        Ok(())
    }

    async fn cancel_tasks_for_job(&self, job_id: Uuid) -> KrakenResult<u64> {
        let status_row: JobTaskStatusRow = JobTaskStatus::Cancelled.into();
        let result = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = $2, detailed_status = $3, updated_at = now()
            WHERE job_execution_id = $1
              AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(job_id)
        .bind(status_row)
        .bind(detailed_status_to_db(JobTaskDetailedStatus::Cancelled))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("cancel tasks for job {job_id}"), e))?;
        Ok(result.rows_affected())
    }

    async fn apply_keyspace_correction(
        &self,
        job_id: Uuid,
        after_chunk: i64,
        delta: i64,
        new_effective_keyspace: i64,
    ) -> KrakenResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin apply_keyspace_correction", e))?;

        sqlx::query("SELECT id FROM job_executions WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("lock job {job_id}"), e))?;

        sqlx::query(
            "UPDATE job_executions SET effective_keyspace = GREATEST(effective_keyspace, $2), updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .bind(new_effective_keyspace)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("rewrite effective_keyspace for job {job_id}"), e))?;

        if delta != 0 {
            sqlx::query(
                r#"
                UPDATE job_tasks
                SET effective_keyspace_start = effective_keyspace_start + $3,
                    effective_keyspace_end = effective_keyspace_end + $3,
                    updated_at = now()
                WHERE job_execution_id = $1
                  AND chunk_number > $2
                  AND is_actual_keyspace = false
                "#,
            )
            .bind(job_id)
            .bind(after_chunk)
            .bind(delta)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("shift sibling task windows for job {job_id}"), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit apply_keyspace_correction", e))?;
        Ok(())
    }
}
