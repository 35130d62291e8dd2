use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work handed to exactly one agent (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    ReconnectPending,
}

impl JobTaskStatus {
    /// Valid `status` transitions per the state machine in §4.4. `cancel` is
    /// allowed from any non-terminal state and is checked separately by
    /// callers via [`JobTaskStatus::is_terminal`].
    pub fn can_transition_to(&self, target: &JobTaskStatus) -> bool {
        use JobTaskStatus::*;
        matches!(
            (self, target),
            (Pending, Assigned)
                | (Assigned, Running)
                | (Assigned, ReconnectPending)
                | (Running, ReconnectPending)
                | (Running, Completed)
                | (Running, Failed)
                | (Assigned, Failed)
                | (ReconnectPending, Running)
                | (ReconnectPending, Pending)
                | (Failed, Pending)
                // cancel is valid from any non-terminal state
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
                | (Running, Cancelled)
                | (ReconnectPending, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobTaskStatus::Completed | JobTaskStatus::Failed | JobTaskStatus::Cancelled
        )
    }

    /// The `detailed_status` values a DB check constraint permits paired
    /// with this `status` (§4.4 "Status/detailed_status coupling").
    pub fn allowed_detailed_statuses(&self) -> &'static [JobTaskDetailedStatus] {
        use JobTaskDetailedStatus::*;
        match self {
            JobTaskStatus::Pending => &[Pending],
            JobTaskStatus::Assigned => &[Dispatched],
            JobTaskStatus::Running => &[Running, RunningWithCracks],
            JobTaskStatus::Completed => &[CompletedWithCracks, CompletedNoCracks],
            JobTaskStatus::Failed => &[Failed],
            JobTaskStatus::Cancelled => &[Cancelled],
            JobTaskStatus::ReconnectPending => &[ReconnectPending],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTaskDetailedStatus {
    Pending,
    Dispatched,
    Running,
    RunningWithCracks,
    CompletedWithCracks,
    CompletedNoCracks,
    Failed,
    Cancelled,
    ReconnectPending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTask {
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

    pub status: JobTaskStatus,
    pub detailed_status: JobTaskDetailedStatus,
    pub priority: i32,
    pub attack_cmd: Option<String>,
    pub benchmark_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub chunk_duration_seconds: u64,

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

impl JobTask {
    /// `effective_keyspace_end - effective_keyspace_start`, the denominator
    /// for per-task progress (§4.6).
    pub fn effective_window_size(&self) -> i64 {
        self.effective_keyspace_end - self.effective_keyspace_start
    }

    /// `keyspace_end - keyspace_start` for the base (non-effective) window.
    pub fn window_size(&self) -> i64 {
        self.keyspace_end - self.keyspace_start
    }

    /// Two tasks "overlap" iff both their keyspace windows and (when both
    /// are rule-split) their rule windows intersect — the rectangle-overlap
    /// invariant in §3/§4.3.
    pub fn overlaps(&self, other: &JobTask) -> bool {
        if self.job_execution_id != other.job_execution_id {
            return false;
        }
        let keyspace_overlap =
            self.keyspace_start < other.keyspace_end && other.keyspace_start < self.keyspace_end;
        if !keyspace_overlap {
            return false;
        }
        match (
            self.is_rule_split_task,
            other.is_rule_split_task,
            self.rule_start_index,
            self.rule_end_index,
            other.rule_start_index,
            other.rule_end_index,
        ) {
            (true, true, Some(s1), Some(e1), Some(s2), Some(e2)) => s1 < e2 && s2 < e1,
            _ => true,
        }
    }
}
