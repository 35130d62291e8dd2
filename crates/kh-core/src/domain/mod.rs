//! The scheduler's typed domain model: agents, benchmarks, hashlists,
//! hashes, preset jobs, job executions, tasks, schedules, and claim
//! vouchers.

pub mod agent;
pub mod benchmark;
pub mod claim_voucher;
pub mod hashlist;
pub mod job_execution;
pub mod job_task;
pub mod preset_job;
pub mod schedule;

pub use agent::{Agent, AgentStatus, Device, DeviceKind};
pub use benchmark::Benchmark;
pub use claim_voucher::ClaimVoucher;
pub use hashlist::{Hash, Hashlist, HashlistStatus};
pub use job_execution::{JobExecution, JobExecutionStatus};
pub use job_task::{JobTask, JobTaskDetailedStatus, JobTaskStatus};
pub use preset_job::{AttackMode, PresetJob};
pub use schedule::Schedule;
