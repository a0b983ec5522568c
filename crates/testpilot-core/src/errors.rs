use testpilot_client::{ClientError, SessionId};

use crate::poll::PollKind;

/// Failures of an orchestration step. The `Display` text is what the view
/// surfaces as its error message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    /// Bad local input; never reaches the network.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The generation trigger request failed.
    #[error("test generation request failed: {0}")]
    Generation(#[source] ClientError),
    /// The execution trigger request failed.
    #[error("test execution request failed: {0}")]
    Execution(#[source] ClientError),
    /// Loading the session list failed.
    #[error("failed to load sessions: {0}")]
    SessionList(#[source] ClientError),
    /// A polled session was absent when it was required to exist.
    #[error("session not found: {0}")]
    NotFound(SessionId),
    /// The poll's attempt budget ran out.
    #[error("{kind} timed out after {attempts} attempts")]
    Timeout { kind: PollKind, attempts: u32 },
}

/// Invalid `TESTPILOT_*` configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}
