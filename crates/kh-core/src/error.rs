use thiserror::Error;

/// The error taxonomy shared by every layer of the scheduler: store, keyspace
/// arithmetic, lifecycle transitions, and the daemon's background loops.
///
/// Each variant maps to one of the seven error classes the scheduler must
/// distinguish: whether a caller sees a 404/400/409, whether a task should be
/// retried, failed outright, or moved to `reconnect_pending`, or whether the
/// failure is purely internal and should be logged and surfaced opaquely.
#[derive(Debug, Error)]
pub enum KrakenError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// An agent-local failure whose hashcat exit code means "retry elsewhere".
    #[error("transient task error: {0}")]
    TransientTaskError(String),

    /// A failure caused by the job/attack definition itself; retrying will
    /// not help.
    #[error("permanent task error: {0}")]
    PermanentTaskError(String),

    /// The agent disconnected mid-task; the task must move to
    /// `reconnect_pending` rather than fail outright.
    #[error("agent lost: {0}")]
    AgentLostError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl KrakenError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidInput(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Whether this error should drive a task toward retry rather than a
    /// terminal failure.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientTaskError(_) | Self::AgentLostError(_))
    }
}

impl From<serde_json::Error> for KrakenError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalError(e.to_string())
    }
}

pub type KrakenResult<T> = Result<T, KrakenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_agent_lost_are_retriable() {
        assert!(KrakenError::TransientTaskError("x".into()).is_retriable());
        assert!(KrakenError::AgentLostError("x".into()).is_retriable());
    }

    #[test]
    fn permanent_and_not_found_are_not_retriable() {
        assert!(!KrakenError::PermanentTaskError("x".into()).is_retriable());
        assert!(!KrakenError::not_found("job 1").is_retriable());
    }
}
