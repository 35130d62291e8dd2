use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkSizerError {
    /// The agent has no current benchmark for this (attack_mode, hash_type);
    /// the caller must dispatch a `benchmark_request` first (§4.2 step 1).
    #[error("agent needs a benchmark before it can be assigned work")]
    NeedsBenchmark,
    /// The job has no pending keyspace or rule range left to dispatch.
    #[error("job has no more work to dispatch")]
    NoWorkRemaining,
}

/// What the Scheduler hands to a Task Lifecycle Manager `assign` call: a
/// keyspace window, or (for rule-split jobs) a rule-index window plus a
/// synthetic effective window so progress stays on one linear coordinate
/// (§4.2 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRange {
    Keyspace {
        start: i64,
        end: i64,
    },
    RuleSplit {
        rule_start: i64,
        rule_end: i64,
        effective_start: i64,
        effective_end: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextChunk {
    pub range: ChunkRange,
    pub chunk_number: i64,
}

/// Everything the sizer needs to compute one task's range. Built by the
/// caller (the Scheduler Loop) from the job, the agent's benchmark, and
/// system settings; the sizer itself performs no I/O and holds no lock —
/// the caller is responsible for calling it under the per-job serialization
/// point described in §5.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSizerInput {
    pub benchmark_speed: Option<f64>,
    /// Target wall-clock time for one task. `f64` rather than the whole
    /// seconds the job row stores, so sub-second chunk targets (as in
    /// scenario S1) round the same way the reference scenario specifies.
    pub chunk_duration_seconds: f64,
    pub max_chunk_size: u64,
    pub effective_keyspace: i64,
    pub dispatched_keyspace: i64,
    pub uses_rule_splitting: bool,
    pub base_keyspace: i64,
    /// High-water mark of rule-index dispatch so far for this job.
    pub max_rule_end: i64,
    pub total_rule_count: i64,
    /// Monotonically increasing per-job counter; the caller is responsible
    /// for persisting and incrementing it (§4.2 step 5).
    pub next_chunk_number: i64,
}

pub struct ChunkSizer;

impl ChunkSizer {
    pub fn next_chunk(input: &ChunkSizerInput) -> Result<NextChunk, ChunkSizerError> {
        let speed = input.benchmark_speed.ok_or(ChunkSizerError::NeedsBenchmark)?;

        let range = if input.uses_rule_splitting {
            Self::next_rule_range(input, speed)?
        } else {
            Self::next_keyspace_range(input, speed)?
        };

        Ok(NextChunk {
            range,
            chunk_number: input.next_chunk_number,
        })
    }

    fn next_keyspace_range(
        input: &ChunkSizerInput,
        speed: f64,
    ) -> Result<ChunkRange, ChunkSizerError> {
        let remaining = input.effective_keyspace - input.dispatched_keyspace;
        if remaining <= 0 {
            return Err(ChunkSizerError::NoWorkRemaining);
        }
        let by_speed = (speed * input.chunk_duration_seconds).floor() as i64;
        let chunk_size = by_speed
            .max(1)
            .min(remaining)
            .min(input.max_chunk_size as i64);
        Ok(ChunkRange::Keyspace {
            start: input.dispatched_keyspace,
            end: input.dispatched_keyspace + chunk_size,
        })
    }

    fn next_rule_range(input: &ChunkSizerInput, speed: f64) -> Result<ChunkRange, ChunkSizerError> {
        if input.max_rule_end >= input.total_rule_count {
            return Err(ChunkSizerError::NoWorkRemaining);
        }
        if input.base_keyspace <= 0 {
            return Err(ChunkSizerError::NoWorkRemaining);
        }
        let ratio = input.chunk_duration_seconds * speed / input.base_keyspace as f64;
        let rules_per_chunk = (ratio.round() as i64).max(1);

        let rule_start = input.max_rule_end;
        let rule_end = (rule_start + rules_per_chunk).min(input.total_rule_count);

        Ok(ChunkRange::RuleSplit {
            rule_start,
            rule_end,
            effective_start: rule_start * input.base_keyspace,
            effective_end: rule_end * input.base_keyspace,
        })
    }
}
