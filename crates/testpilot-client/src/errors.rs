use crate::endpoint::Endpoint;

/// Errors returned by the transport and the session fetcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or non-success HTTP status.
    #[error("request failed ({endpoint}): {message}")]
    FetchFailed {
        endpoint: String,
        message: String,
        status_code: Option<u16>,
    },
    /// 2xx response whose payload did not have the expected shape.
    #[error("malformed response ({endpoint}): {message}")]
    MalformedResponse { endpoint: String, message: String },
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Creates a transport-level error.
    pub fn fetch_failed(
        endpoint: &Endpoint,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::FetchFailed {
            endpoint: endpoint.to_string(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a payload-shape error.
    pub fn malformed(endpoint: &Endpoint, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }

    /// HTTP status code, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::FetchFailed { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Short name of a JSON value's type, for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
