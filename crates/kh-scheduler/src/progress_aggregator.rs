//! Pure progress arithmetic (§4.6). No I/O: callers persist whatever these
//! functions compute.

use kh_core::domain::{JobExecution, JobTask};

/// Per-task progress, clamped to `[0, 100]`.
pub fn task_progress_percent(effective_keyspace_processed: i64, task: &JobTask) -> f64 {
    let window = task.effective_window_size();
    if window <= 0 {
        return 100.0;
    }
    let pct = 100.0 * effective_keyspace_processed as f64 / window as f64;
    pct.clamp(0.0, 100.0)
}

/// Per-job progress: the sum of every task's `effective_keyspace_processed`
/// over the job's `effective_keyspace`.
pub fn job_overall_progress(job: &JobExecution, tasks: &[JobTask]) -> f64 {
    if job.effective_keyspace <= 0 {
        return 100.0;
    }
    let processed: i64 = tasks.iter().map(|t| t.effective_keyspace_processed).sum();
    (100.0 * processed as f64 / job.effective_keyspace as f64).clamp(0.0, 100.0)
}

/// One chunk's recorded actual size, in completion order, used by
/// [`rewrite_effective_keyspace`] to recompute prior chunks' windows.
#[derive(Debug, Clone, Copy)]
pub struct CompletedChunkActual {
    pub chunk_number: i64,
    pub actual_keyspace: i64,
}

/// The cascade self-correction rule: when a chunk completes with an actual
/// keyspace that differs from its planned size, every later chunk's
/// effective window shifts by the same delta, and the job's
/// `effective_keyspace` grows to cover the corrected total plus whatever
/// is still planned beyond the last known actual.
///
/// `completed_actuals` must be sorted by `chunk_number` ascending and
/// contain only chunks that have reported an actual (i.e.
/// `is_actual_keyspace = true`); `planned_remaining` is the sum of
/// `effective_window_size()` for every task at or beyond the first chunk
/// that has not yet reported an actual.
pub fn rewrite_effective_keyspace(
    current_effective_keyspace: i64,
    completed_actuals: &[CompletedChunkActual],
    planned_remaining: i64,
) -> i64 {
    let known_actual_total: i64 = completed_actuals.iter().map(|c| c.actual_keyspace).sum();
    (current_effective_keyspace).max(known_actual_total + planned_remaining)
}

/// The rewritten `[start, end)` window for the `index`-th (0-based) chunk
/// among `completed_actuals`, given they are laid out back to back from 0.
pub fn rewritten_chunk_window(completed_actuals: &[CompletedChunkActual], index: usize) -> (i64, i64) {
    let start: i64 = completed_actuals[..index].iter().map(|c| c.actual_keyspace).sum();
    let end = start + completed_actuals[index].actual_keyspace;
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kh_core::domain::{JobExecutionStatus, JobTaskDetailedStatus, JobTaskStatus};
    use uuid::Uuid;

    fn base_task(job: Uuid, start: i64, end: i64) -> JobTask {
        JobTask {
            id: Uuid::new_v4(),
            job_execution_id: job,
            agent_id: None,
            chunk_number: 1,
            keyspace_start: start,
            keyspace_end: end,
            keyspace_processed: 0,
            effective_keyspace_start: start,
            effective_keyspace_end: end,
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
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            last_checkpoint: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    fn base_job(effective_keyspace: i64) -> JobExecution {
        JobExecution {
            id: Uuid::new_v4(),
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
            status: JobExecutionStatus::Running,
            interrupted_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn per_task_progress_is_a_clamped_percentage() {
        let task = base_task(Uuid::new_v4(), 0, 10);
        assert_eq!(task_progress_percent(5, &task), 50.0);
        assert_eq!(task_progress_percent(100, &task), 100.0);
    }

    #[test]
    fn job_overall_progress_sums_across_tasks() {
        let job_id = Uuid::new_v4();
        let job = base_job(8);
        let mut t1 = base_task(job_id, 0, 4);
        t1.effective_keyspace_processed = 4;
        let mut t2 = base_task(job_id, 4, 8);
        t2.effective_keyspace_processed = 2;
        assert_eq!(job_overall_progress(&job, &[t1, t2]), 75.0);
    }

    #[test]
    fn zero_effective_keyspace_job_is_complete() {
        let job = base_job(0);
        assert_eq!(job_overall_progress(&job, &[]), 100.0);
    }

    #[test]
    fn cascade_rewrite_grows_effective_keyspace_on_larger_actual() {
        // Planned 100, but chunk 1 actually took 150; 0 remaining planned.
        let actuals = [CompletedChunkActual {
            chunk_number: 1,
            actual_keyspace: 150,
        }];
        let recomputed = rewrite_effective_keyspace(100, &actuals, 0);
        assert_eq!(recomputed, 150);
    }

    #[test]
    fn cascade_rewrite_never_shrinks_below_current_estimate() {
        let actuals = [CompletedChunkActual {
            chunk_number: 1,
            actual_keyspace: 50,
        }];
        // Remaining planned work still makes up the rest of the original estimate.
        let recomputed = rewrite_effective_keyspace(200, &actuals, 100);
        assert_eq!(recomputed, 200);
    }

    #[test]
    fn rewritten_window_lays_out_chunks_back_to_back() {
        let actuals = [
            CompletedChunkActual { chunk_number: 1, actual_keyspace: 50 },
            CompletedChunkActual { chunk_number: 2, actual_keyspace: 70 },
        ];
        assert_eq!(rewritten_chunk_window(&actuals, 0), (0, 50));
        assert_eq!(rewritten_chunk_window(&actuals, 1), (50, 120));
    }
}
