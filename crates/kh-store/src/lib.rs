//! Postgres persistence for the job scheduling subsystem. Queries are
//! issued with `sqlx::query_as` against string literals rather than the
//! `sqlx::query!` macro so the crate builds without a live database to
//! check against; the row shapes are kept in sync by hand in [`models`].

pub mod agent_store;
pub mod hashlist_store;
pub mod job_store;
pub mod models;
pub mod retention_store;

pub use agent_store::{AgentStore, PgAgentStore};
pub use hashlist_store::{HashlistStore, PgHashlistStore};
pub use job_store::{JobStore, PgJobStore};
pub use retention_store::{PgRetentionStore, RetentionCandidate, RetentionStore};

use kh_core::KrakenError;

/// Embeds sqlx's row/type errors into the shared taxonomy. A missing row on
/// a `fetch_one` becomes [`KrakenError::NotFound`]; everything else is
/// treated as internal, since the caller has no way to retry a broken
/// connection or a malformed query on its own.
pub fn map_sqlx_error(context: &str, err: sqlx::Error) -> KrakenError {
    match err {
        sqlx::Error::RowNotFound => KrakenError::not_found(context),
        other => KrakenError::InternalError(format!("{context}: {other}")),
    }
}
