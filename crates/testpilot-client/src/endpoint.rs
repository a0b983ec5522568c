use std::fmt;

use crate::model::SessionId;

/// HTTP method used by an endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// REST endpoints consumed by the client. All live under `/api`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Endpoint {
    /// `GET /api/GetAllSessions`
    ListSessions,
    /// `GET /api/GetSession/{id}`
    GetSession(SessionId),
    /// `POST /api/generate-testcases`
    GenerateTestCases,
    /// `POST /api/execute-session/{id}`
    ExecuteSession(SessionId),
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Self::ListSessions | Self::GetSession(_) => Method::Get,
            Self::GenerateTestCases | Self::ExecuteSession(_) => Method::Post,
        }
    }

    /// Unencoded path segments after `/api`. Ids are percent-encoded by the
    /// transport when the URL is built.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::ListSessions => vec!["GetAllSessions"],
            Self::GetSession(id) => vec!["GetSession", id.as_str()],
            Self::GenerateTestCases => vec!["generate-testcases"],
            Self::ExecuteSession(id) => vec!["execute-session", id.as_str()],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /api/{}", self.method().as_str(), self.segments().join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_method_and_path() {
        assert_eq!(Endpoint::ListSessions.to_string(), "GET /api/GetAllSessions");
        assert_eq!(
            Endpoint::ExecuteSession(SessionId::new("s1")).to_string(),
            "POST /api/execute-session/s1"
        );
    }
}
