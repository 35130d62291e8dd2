//! Row shapes and the conversions between them and `kh_core::domain`
//! types. Status columns are native Postgres enums; `sqlx::Type` derives
//! give us a compile-time-checked Rust side without hand-written
//! `to_string`/`from_str` round trips for every status.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use kh_core::domain::{
    Agent, AgentStatus, Benchmark, ClaimVoucher, Device, DeviceKind, Hash, Hashlist,
    HashlistStatus, JobExecution, JobExecutionStatus, JobTask, JobTaskDetailedStatus,
    JobTaskStatus, PresetJob, Schedule,
};
use kh_core::error::KrakenError;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "agent_status", rename_all = "snake_case")]
pub enum AgentStatusRow {
    Active,
    Inactive,
    Error,
}

impl From<AgentStatus> for AgentStatusRow {
    fn from(s: AgentStatus) -> Self {
        match s {
            AgentStatus::Active => Self::Active,
            AgentStatus::Inactive => Self::Inactive,
            AgentStatus::Error => Self::Error,
        }
    }
}

impl From<AgentStatusRow> for AgentStatus {
    fn from(s: AgentStatusRow) -> Self {
        match s {
            AgentStatusRow::Active => Self::Active,
            AgentStatusRow::Inactive => Self::Inactive,
            AgentStatusRow::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "job_execution_status", rename_all = "snake_case")]
pub enum JobExecutionStatusRow {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<JobExecutionStatus> for JobExecutionStatusRow {
    fn from(s: JobExecutionStatus) -> Self {
        match s {
            JobExecutionStatus::Pending => Self::Pending,
            JobExecutionStatus::Running => Self::Running,
            JobExecutionStatus::Completed => Self::Completed,
            JobExecutionStatus::Failed => Self::Failed,
            JobExecutionStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<JobExecutionStatusRow> for JobExecutionStatus {
    fn from(s: JobExecutionStatusRow) -> Self {
        match s {
            JobExecutionStatusRow::Pending => Self::Pending,
            JobExecutionStatusRow::Running => Self::Running,
            JobExecutionStatusRow::Completed => Self::Completed,
            JobExecutionStatusRow::Failed => Self::Failed,
            JobExecutionStatusRow::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "job_task_status", rename_all = "snake_case")]
pub enum JobTaskStatusRow {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    ReconnectPending,
}

impl From<JobTaskStatus> for JobTaskStatusRow {
    fn from(s: JobTaskStatus) -> Self {
        match s {
            JobTaskStatus::Pending => Self::Pending,
            JobTaskStatus::Assigned => Self::Assigned,
            JobTaskStatus::Running => Self::Running,
            JobTaskStatus::Completed => Self::Completed,
            JobTaskStatus::Failed => Self::Failed,
            JobTaskStatus::Cancelled => Self::Cancelled,
            JobTaskStatus::ReconnectPending => Self::ReconnectPending,
        }
    }
}

impl From<JobTaskStatusRow> for JobTaskStatus {
    fn from(s: JobTaskStatusRow) -> Self {
        match s {
            JobTaskStatusRow::Pending => Self::Pending,
            JobTaskStatusRow::Assigned => Self::Assigned,
            JobTaskStatusRow::Running => Self::Running,
            JobTaskStatusRow::Completed => Self::Completed,
            JobTaskStatusRow::Failed => Self::Failed,
            JobTaskStatusRow::Cancelled => Self::Cancelled,
            JobTaskStatusRow::ReconnectPending => Self::ReconnectPending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "hashlist_status", rename_all = "snake_case")]
pub enum HashlistStatusRow {
    Uploading,
    Ready,
    Processing,
    Error,
}

impl From<HashlistStatus> for HashlistStatusRow {
    fn from(s: HashlistStatus) -> Self {
        match s {
            HashlistStatus::Uploading => Self::Uploading,
            HashlistStatus::Ready => Self::Ready,
            HashlistStatus::Processing => Self::Processing,
            HashlistStatus::Error => Self::Error,
        }
    }
}

impl From<HashlistStatusRow> for HashlistStatus {
    fn from(s: HashlistStatusRow) -> Self {
        match s {
            HashlistStatusRow::Uploading => Self::Uploading,
            HashlistStatusRow::Ready => Self::Ready,
            HashlistStatusRow::Processing => Self::Processing,
            HashlistStatusRow::Error => Self::Error,
        }
    }
}

/// `detailed_status` is stored as `TEXT` (its legal values are already
/// pinned by the `job_tasks` CHECK constraint alongside `status`), so the
/// Rust side round-trips through snake_case strings by hand.
pub fn detailed_status_to_db(status: JobTaskDetailedStatus) -> &'static str {
    match status {
        JobTaskDetailedStatus::Pending => "pending",
        JobTaskDetailedStatus::Dispatched => "dispatched",
        JobTaskDetailedStatus::Running => "running",
        JobTaskDetailedStatus::RunningWithCracks => "running_with_cracks",
        JobTaskDetailedStatus::CompletedWithCracks => "completed_with_cracks",
        JobTaskDetailedStatus::CompletedNoCracks => "completed_no_cracks",
        JobTaskDetailedStatus::Failed => "failed",
        JobTaskDetailedStatus::Cancelled => "cancelled",
        JobTaskDetailedStatus::ReconnectPending => "reconnect_pending",
    }
}

pub fn detailed_status_from_db(value: &str) -> Result<JobTaskDetailedStatus, KrakenError> {
    match value {
        "pending" => Ok(JobTaskDetailedStatus::Pending),
        "dispatched" => Ok(JobTaskDetailedStatus::Dispatched),
        "running" => Ok(JobTaskDetailedStatus::Running),
        "running_with_cracks" => Ok(JobTaskDetailedStatus::RunningWithCracks),
        "completed_with_cracks" => Ok(JobTaskDetailedStatus::CompletedWithCracks),
        "completed_no_cracks" => Ok(JobTaskDetailedStatus::CompletedNoCracks),
        "failed" => Ok(JobTaskDetailedStatus::Failed),
        "cancelled" => Ok(JobTaskDetailedStatus::Cancelled),
        "reconnect_pending" => Ok(JobTaskDetailedStatus::ReconnectPending),
        other => Err(KrakenError::InternalError(format!(
            "unknown detailed_status {other:?} in job_tasks row"
        ))),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobExecutionRow {
    pub id: Uuid,
    pub preset_job_id: i64,
    pub hashlist_id: i64,
    pub priority: i32,
    pub base_keyspace: i64,
    pub multiplication_factor: i64,
    pub effective_keyspace: i64,
    pub processed_keyspace: i64,
    pub dispatched_keyspace: i64,
    pub overall_progress_percent: f64,
    pub uses_rule_splitting: bool,
    pub rule_split_count: Option<i64>,
    pub consecutive_failures: i32,
    pub max_agents: i32,
    pub is_small_job: bool,
    pub allow_high_priority_override: bool,
    pub status: JobExecutionStatusRow,
    pub interrupted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobExecutionRow> for JobExecution {
    fn from(row: JobExecutionRow) -> Self {
        JobExecution {
            id: row.id,
            preset_job_id: row.preset_job_id,
            hashlist_id: row.hashlist_id,
            priority: row.priority,
            base_keyspace: row.base_keyspace,
            multiplication_factor: row.multiplication_factor,
            effective_keyspace: row.effective_keyspace,
            processed_keyspace: row.processed_keyspace,
            dispatched_keyspace: row.dispatched_keyspace,
            overall_progress_percent: row.overall_progress_percent,
            uses_rule_splitting: row.uses_rule_splitting,
            rule_split_count: row.rule_split_count,
            consecutive_failures: row.consecutive_failures,
            max_agents: row.max_agents,
            is_small_job: row.is_small_job,
            allow_high_priority_override: row.allow_high_priority_override,
            status: row.status.into(),
            interrupted_by: row.interrupted_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobTaskRow {
    pub id: Uuid,
    pub job_execution_id: Uuid,
    pub agent_id: Option<i64>,
    pub chunk_number: i64,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub keyspace_processed: i64,
    pub effective_keyspace_start: i64,
    pub effective_keyspace_end: i64,
    pub effective_keyspace_processed: i64,
    pub is_actual_keyspace: bool,
    pub chunk_actual_keyspace: Option<i64>,
    pub is_rule_split_task: bool,
    pub rule_start_index: Option<i64>,
    pub rule_end_index: Option<i64>,
    pub rule_chunk_path: Option<String>,
    pub status: JobTaskStatusRow,
    pub detailed_status: String,
    pub priority: i32,
    pub attack_cmd: Option<String>,
    pub benchmark_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub chunk_duration_seconds: i64,
    pub crack_count: i64,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub progress_percent: f64,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_checkpoint: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobTaskRow> for JobTask {
    type Error = KrakenError;

    fn try_from(row: JobTaskRow) -> Result<Self, Self::Error> {
        Ok(JobTask {
            id: row.id,
            job_execution_id: row.job_execution_id,
            agent_id: row.agent_id,
            chunk_number: row.chunk_number,
            keyspace_start: row.keyspace_start,
            keyspace_end: row.keyspace_end,
            keyspace_processed: row.keyspace_processed,
            effective_keyspace_start: row.effective_keyspace_start,
            effective_keyspace_end: row.effective_keyspace_end,
            effective_keyspace_processed: row.effective_keyspace_processed,
            is_actual_keyspace: row.is_actual_keyspace,
            chunk_actual_keyspace: row.chunk_actual_keyspace,
            is_rule_split_task: row.is_rule_split_task,
            rule_start_index: row.rule_start_index,
            rule_end_index: row.rule_end_index,
            rule_chunk_path: row.rule_chunk_path,
            status: row.status.into(),
            detailed_status: detailed_status_from_db(&row.detailed_status)?,
            priority: row.priority,
            attack_cmd: row.attack_cmd,
            benchmark_speed: row.benchmark_speed,
            average_speed: row.average_speed,
            chunk_duration_seconds: row.chunk_duration_seconds as u64,
            crack_count: row.crack_count,
            retry_count: row.retry_count,
            error_message: row.error_message,
            progress_percent: row.progress_percent,
            created_at: row.created_at,
            assigned_at: row.assigned_at,
            started_at: row.started_at,
            last_checkpoint: row.last_checkpoint,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub status: AgentStatusRow,
    pub enabled: bool,
    pub scheduling_enabled: bool,
    pub consecutive_failures: i32,
    pub timezone: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub current_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRow {
    /// Assembles the domain `Agent`, merging in devices fetched by a
    /// separate query (kept off the wide `agents` row to avoid a join that
    /// would repeat the parent columns once per device).
    pub fn into_domain(self, devices: Vec<Device>) -> Result<Agent, KrakenError> {
        let timezone: chrono_tz::Tz = self
            .timezone
            .parse()
            .map_err(|_| KrakenError::InternalError(format!("bad timezone {:?}", self.timezone)))?;
        Ok(Agent {
            id: self.id,
            name: self.name,
            owner_id: self.owner_id,
            status: self.status.into(),
            enabled: self.enabled,
            scheduling_enabled: self.scheduling_enabled,
            consecutive_failures: self.consecutive_failures,
            timezone,
            devices,
            last_heartbeat: self.last_heartbeat,
            current_task_id: self.current_task_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    pub device_index: i32,
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub extra: serde_json::Value,
}

impl TryFrom<DeviceRow> for Device {
    type Error = KrakenError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "gpu" => DeviceKind::Gpu,
            "cpu" => DeviceKind::Cpu,
            other => {
                return Err(KrakenError::InternalError(format!(
                    "unknown device kind {other:?}"
                )))
            }
        };
        let extra = match row.extra {
            serde_json::Value::Object(map) => map,
            _ => Default::default(),
        };
        Ok(Device {
            device_index: row.device_index,
            name: row.name,
            kind,
            enabled: row.enabled,
            extra,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BenchmarkRow {
    pub agent_id: i64,
    pub attack_mode: i32,
    pub hash_type: i32,
    pub hashes_per_second: f64,
    pub recorded_at: DateTime<Utc>,
}

impl From<BenchmarkRow> for Benchmark {
    fn from(row: BenchmarkRow) -> Self {
        Benchmark {
            agent_id: row.agent_id,
            attack_mode: row.attack_mode,
            hash_type: row.hash_type,
            hashes_per_second: row.hashes_per_second,
            recorded_at: row.recorded_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub agent_id: i64,
    pub weekday: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: String,
    pub active: bool,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = KrakenError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let weekday = weekday_from_i16(row.weekday)?;
        let timezone: chrono_tz::Tz = row
            .timezone
            .parse()
            .map_err(|_| KrakenError::InternalError(format!("bad timezone {:?}", row.timezone)))?;
        Ok(Schedule {
            agent_id: row.agent_id,
            weekday,
            start_time: row.start_time,
            end_time: row.end_time,
            timezone,
            active: row.active,
        })
    }
}

fn weekday_from_i16(value: i16) -> Result<Weekday, KrakenError> {
    match value {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(KrakenError::InternalError(format!(
            "weekday out of range: {other}"
        ))),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HashlistRow {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub client_id: i64,
    pub hash_type_id: i32,
    pub file_path: String,
    pub total_hashes: i64,
    pub cracked_hashes: i64,
    pub status: HashlistStatusRow,
    pub exclude_from_potfile: bool,
    pub created_at: DateTime<Utc>,
}

impl From<HashlistRow> for Hashlist {
    fn from(row: HashlistRow) -> Self {
        Hashlist {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            client_id: row.client_id,
            hash_type_id: row.hash_type_id,
            file_path: row.file_path,
            total_hashes: row.total_hashes,
            cracked_hashes: row.cracked_hashes,
            status: row.status.into(),
            exclude_from_potfile: row.exclude_from_potfile,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HashRow {
    pub id: Uuid,
    pub hash_type_id: i32,
    pub hash_value: String,
    pub original_hash: Option<String>,
    pub username: Option<String>,
    pub domain: Option<String>,
    pub is_cracked: bool,
    pub password: Option<String>,
}

impl From<HashRow> for Hash {
    fn from(row: HashRow) -> Self {
        Hash {
            id: row.id,
            hash_type_id: row.hash_type_id,
            hash_value: row.hash_value,
            original_hash: row.original_hash,
            username: row.username,
            domain: row.domain,
            is_cracked: row.is_cracked,
            password: row.password,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PresetJobRow {
    pub id: i64,
    pub name: String,
    pub attack_mode: i32,
    pub wordlist_ids: Vec<i64>,
    pub rule_ids: Vec<i64>,
    pub mask: Option<String>,
    pub priority: i32,
    pub chunk_duration_seconds: i64,
    pub is_small_job: bool,
    pub allow_high_priority_override: bool,
    pub binary_version_id: i64,
    pub additional_args: Option<String>,
}

impl TryFrom<PresetJobRow> for PresetJob {
    type Error = KrakenError;

    fn try_from(row: PresetJobRow) -> Result<Self, Self::Error> {
        let attack_mode = kh_core::domain::AttackMode::from_i32(row.attack_mode).ok_or_else(|| {
            KrakenError::InternalError(format!("unknown attack_mode {}", row.attack_mode))
        })?;
        Ok(PresetJob {
            id: row.id,
            name: row.name,
            attack_mode,
            wordlist_ids: row.wordlist_ids,
            rule_ids: row.rule_ids,
            mask: row.mask,
            priority: row.priority,
            chunk_duration_seconds: row.chunk_duration_seconds as u64,
            is_small_job: row.is_small_job,
            allow_high_priority_override: row.allow_high_priority_override,
            binary_version_id: row.binary_version_id,
            additional_args: row.additional_args,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimVoucherRow {
    pub code: String,
    pub created_by: i64,
    pub is_continuous: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_by_agent_id: Option<i64>,
}

impl From<ClaimVoucherRow> for ClaimVoucher {
    fn from(row: ClaimVoucherRow) -> Self {
        ClaimVoucher {
            code: row.code,
            created_by: row.created_by,
            is_continuous: row.is_continuous,
            consumed_at: row.consumed_at,
            consumed_by_agent_id: row.consumed_by_agent_id,
        }
    }
}
