//! Pure keyspace arithmetic: translating an attack specification into a
//! base/effective keyspace and a rule-splitting decision (§4.1), then
//! translating a benchmarked agent into the next task's range (§4.2).
//!
//! Neither module performs I/O; both operate on plain numbers and small
//! structs handed in by the caller (mirrors the teacher's `TaskScheduler`,
//! which is likewise a pure decision struct with no store access of its
//! own).

pub mod calculator;
pub mod chunk_sizer;

pub use calculator::{AttackSpec, KeyspaceCalculator, KeyspaceError, KeyspaceResult};
pub use chunk_sizer::{ChunkRange, ChunkSizer, ChunkSizerError, NextChunk};
