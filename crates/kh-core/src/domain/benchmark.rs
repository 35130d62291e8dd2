use chrono::{DateTime, Utc};

/// `(agent_id, attack_mode, hash_type) -> hashes_per_second`, upserted
/// whenever an agent completes a task (§4.4 `complete`) or reports a
/// dedicated `benchmark_result` message (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    pub agent_id: i64,
    pub attack_mode: i32,
    pub hash_type: i32,
    pub hashes_per_second: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Benchmark {
    /// A benchmark older than `max_age` can no longer be used to size a
    /// chunk; the caller must request a fresh one (§4.2 step 1).
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.recorded_at > max_age
    }
}
