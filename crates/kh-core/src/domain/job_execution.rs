use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobExecutionStatus {
    pub fn can_transition_to(&self, target: &JobExecutionStatus) -> bool {
        use JobExecutionStatus::*;
        matches!(
            (self, target),
            (Pending, Running)
                | (Running, Pending) // preemption (§4.3 step 2)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobExecutionStatus::Completed
                | JobExecutionStatus::Failed
                | JobExecutionStatus::Cancelled
        )
    }
}

/// A concrete run of a `PresetJob` against a `Hashlist` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
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
    /// 0 = unlimited; overridden to 1 by `is_small_job` at creation time.
    pub max_agents: i32,
    pub is_small_job: bool,
    pub allow_high_priority_override: bool,

    pub status: JobExecutionStatus,
    pub interrupted_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobExecution {
    /// Effective per-job agent concurrency cap (§4.3 step 4).
    pub fn agent_cap(&self) -> Option<u32> {
        if self.is_small_job {
            Some(1)
        } else if self.max_agents > 0 {
            Some(self.max_agents as u32)
        } else {
            None
        }
    }

    pub fn undispatched_keyspace(&self) -> i64 {
        (self.effective_keyspace - self.dispatched_keyspace).max(0)
    }

    pub fn has_undispatched_work(&self) -> bool {
        self.undispatched_keyspace() > 0
    }

    /// Checks invariant 1 (§8): `0 <= processed <= dispatched <= effective`.
    pub fn invariants_hold(&self) -> bool {
        0 <= self.processed_keyspace
            && self.processed_keyspace <= self.dispatched_keyspace
            && self.dispatched_keyspace <= self.effective_keyspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> JobExecution {
        JobExecution {
            id: Uuid::new_v4(),
            preset_job_id: 1,
            hashlist_id: 1,
            priority: 500,
            base_keyspace: 100,
            multiplication_factor: 1,
            effective_keyspace: 100,
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

    #[test]
    fn max_agents_zero_is_unlimited() {
        let job = base_job();
        assert_eq!(job.agent_cap(), None);
    }

    #[test]
    fn small_job_caps_at_one_agent_regardless_of_max_agents() {
        let mut job = base_job();
        job.is_small_job = true;
        job.max_agents = 5;
        assert_eq!(job.agent_cap(), Some(1));
    }

    #[test]
    fn max_agents_one_behaves_like_small_job() {
        let mut a = base_job();
        a.max_agents = 1;
        let mut b = base_job();
        b.is_small_job = true;
        assert_eq!(a.agent_cap(), b.agent_cap());
    }

    #[test]
    fn invariants_hold_on_fresh_job() {
        assert!(base_job().invariants_hold());
    }

    #[test]
    fn invariants_detect_violation() {
        let mut job = base_job();
        job.dispatched_keyspace = 50;
        job.processed_keyspace = 60;
        assert!(!job.invariants_hold());
    }
}
