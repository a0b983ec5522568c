use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::steps::normalize_steps;

/// Server-assigned session identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the session id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Session status as reported by the server.
///
/// Missing statuses normalize to `InProgress`. Server-defined values that are
/// neither "in progress" nor "completed" are kept verbatim.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Completed,
    Other(String),
}

impl SessionStatus {
    /// Case-insensitive "completed" check used by the execution poll.
    pub fn is_completed(&self) -> bool {
        match self {
            Self::Completed => true,
            Self::InProgress => false,
            Self::Other(raw) => raw.trim().eq_ignore_ascii_case("completed"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Other(raw) => raw,
        }
    }
}

impl From<Option<String>> for SessionStatus {
    fn from(value: Option<String>) -> Self {
        let Some(raw) = value else {
            return Self::InProgress;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("in progress") {
            Self::InProgress
        } else if trimmed.eq_ignore_ascii_case("completed") {
            Self::Completed
        } else {
            Self::Other(raw)
        }
    }
}

impl From<SessionStatus> for String {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Other(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of a single test case.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestStatus {
    Pass,
    Fail,
    Pending,
    Other(String),
}

impl TestStatus {
    /// A status other than pending. Unknown server statuses count as terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Pending => "Pending",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for TestStatus {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("pending") {
            Self::Pending
        } else if trimmed.eq_ignore_ascii_case("pass") {
            Self::Pass
        } else if trimmed.eq_ignore_ascii_case("fail") {
            Self::Fail
        } else {
            Self::Other(raw)
        }
    }
}

impl From<TestStatus> for String {
    fn from(value: TestStatus) -> Self {
        match value {
            TestStatus::Other(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One generated test belonging to a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Database row id; the single-session endpoint omits it.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub test_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// `None` when the server has not reported a status yet.
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
    /// Raw steps text as sent by the server. See [`TestCase::normalized_steps`].
    #[serde(default, deserialize_with = "steps_text")]
    pub steps: String,
    #[serde(default)]
    pub executed_at: Option<String>,
}

impl TestCase {
    /// Present and not pending.
    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(TestStatus::is_terminal)
    }

    /// Human-readable steps (numbered list when the server sent JSON).
    pub fn normalized_steps(&self) -> String {
        normalize_steps(&self.steps)
    }
}

/// One generation-and-execution workflow instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub num_test_cases: Option<u32>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Session {
    /// Creates an in-progress session with no test cases.
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            url: None,
            num_test_cases: None,
            status: SessionStatus::InProgress,
            test_cases: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn has_test_cases(&self) -> bool {
        !self.test_cases.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts steps as a string, or as a JSON array/object which is kept in its
/// JSON text form so normalization can number it later.
fn steps_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}
