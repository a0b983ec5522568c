//! Session Fetcher: wraps the read and trigger endpoints and normalizes
//! server payloads into [`Session`] records.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::errors::{ClientError, json_kind};
use crate::model::{Session, SessionId, TestCase};
use crate::transport::Transport;

/// Stateless facade over the REST endpoints.
#[derive(Clone)]
pub struct SessionFetcher {
    transport: Arc<dyn Transport>,
}

impl SessionFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Reads every session.
    ///
    /// A non-array payload is `MalformedResponse`; transport failures are
    /// `FetchFailed`. Neither is retried here.
    pub async fn list_all(&self) -> Result<Vec<Session>, ClientError> {
        let endpoint = Endpoint::ListSessions;
        let payload = self.transport.send(&endpoint, None).await?;
        decode_session_list(&endpoint, payload)
    }

    /// Reads one session with its test cases.
    ///
    /// Returns `None` when the server has no such session yet or the request
    /// fails: during generation the session is polled before it exists.
    pub async fn get_by_id(&self, id: &SessionId) -> Option<Session> {
        let endpoint = Endpoint::GetSession(id.clone());
        match self.transport.send(&endpoint, None).await {
            Ok(payload) => decode_session_envelope(&endpoint, payload),
            Err(err) => {
                debug!(
                    event = "session.fetch_absent",
                    domain = "fetch",
                    session_id = %id,
                    error = %err
                );
                None
            }
        }
    }

    /// Starts server-side generation. Returns the new session id when the
    /// server reports one.
    pub async fn generate_test_cases(
        &self,
        url: &str,
        num_test_cases: u32,
    ) -> Result<Option<SessionId>, ClientError> {
        let endpoint = Endpoint::GenerateTestCases;
        let body = serde_json::json!({ "url": url, "num_test_cases": num_test_cases });
        let payload = self.transport.send(&endpoint, Some(body)).await?;
        Ok(payload
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(SessionId::from))
    }

    /// Starts server-side execution. The response is an acknowledgement only.
    pub async fn execute_session(&self, id: &SessionId) -> Result<(), ClientError> {
        let endpoint = Endpoint::ExecuteSession(id.clone());
        self.transport.send(&endpoint, None).await?;
        Ok(())
    }
}

pub(crate) fn decode_session_list(
    endpoint: &Endpoint,
    payload: Value,
) -> Result<Vec<Session>, ClientError> {
    let Value::Array(items) = payload else {
        return Err(ClientError::malformed(
            endpoint,
            format!("expected a list of sessions, got {}", json_kind(&payload)),
        ));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<Session>(item).map_err(|e| {
                ClientError::malformed(endpoint, format!("session #{index}: {e}"))
            })
        })
        .collect()
}

/// `{ session: {...}, test_cases: [...] }`. A missing or null `session` means
/// the session does not exist yet.
pub(crate) fn decode_session_envelope(endpoint: &Endpoint, payload: Value) -> Option<Session> {
    let Value::Object(mut envelope) = payload else {
        return None;
    };
    let raw_session = envelope.remove("session").filter(Value::is_object)?;
    let mut session = match serde_json::from_value::<Session>(raw_session) {
        Ok(session) => session,
        Err(err) => {
            warn!(
                event = "session.decode_failed",
                domain = "fetch",
                endpoint = %endpoint,
                error = %err
            );
            return None;
        }
    };
    session.test_cases = match envelope.remove("test_cases") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => match serde_json::from_value::<Vec<TestCase>>(raw) {
            Ok(cases) => cases,
            Err(err) => {
                warn!(
                    event = "session.decode_failed",
                    domain = "fetch",
                    endpoint = %endpoint,
                    error = %err
                );
                return None;
            }
        },
    };
    Some(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionStatus, TestStatus};
    use crate::testing::ScriptedTransport;

    fn fetcher(transport: &Arc<ScriptedTransport>) -> SessionFetcher {
        SessionFetcher::new(transport.clone())
    }

    #[tokio::test]
    async fn list_all_normalizes_records() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(
            Endpoint::ListSessions,
            serde_json::json!([
                {"session_id": "a", "status": "Completed", "test_cases": [{"test_id": 1, "status": "Pass"}]},
                {"session_id": "b"}
            ]),
        );
        let sessions = fetcher(&transport).list_all().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].test_cases[0].status, Some(TestStatus::Pass));
        assert_eq!(sessions[1].status, SessionStatus::InProgress);
        assert!(sessions[1].test_cases.is_empty());
    }

    #[tokio::test]
    async fn list_all_rejects_non_list_payload() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(Endpoint::ListSessions, serde_json::json!({"detail": "oops"}));
        let err = fetcher(&transport).list_all().await.unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("got object"));
    }

    #[tokio::test]
    async fn list_all_surfaces_transport_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Endpoint::ListSessions,
            Err(ClientError::fetch_failed(&Endpoint::ListSessions, "boom", Some(500))),
        );
        let err = fetcher(&transport).list_all().await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn get_by_id_merges_envelope_test_cases() {
        let transport = Arc::new(ScriptedTransport::new());
        let id = SessionId::new("s1");
        transport.respond_ok(
            Endpoint::GetSession(id.clone()),
            serde_json::json!({
                "session": {"session_id": "s1", "status": null, "url": "http://x"},
                "stats": {"Pending": 2},
                "test_cases": [{"test_id": 1, "title": "a"}, {"test_id": 2, "title": "b"}]
            }),
        );
        let session = fetcher(&transport).get_by_id(&id).await.unwrap();
        assert_eq!(session.session_id, id);
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.test_cases.len(), 2);
        assert_eq!(session.url.as_deref(), Some("http://x"));
    }

    #[tokio::test]
    async fn get_by_id_is_absent_on_missing_session_or_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        let missing = SessionId::new("missing");
        transport.respond_ok(
            Endpoint::GetSession(missing.clone()),
            serde_json::json!({"session": null, "test_cases": []}),
        );
        assert!(fetcher(&transport).get_by_id(&missing).await.is_none());

        let failing = SessionId::new("failing");
        transport.respond(
            Endpoint::GetSession(failing.clone()),
            Err(ClientError::fetch_failed(
                &Endpoint::GetSession(failing.clone()),
                "not found",
                Some(404),
            )),
        );
        assert!(fetcher(&transport).get_by_id(&failing).await.is_none());
    }

    #[tokio::test]
    async fn generate_sends_body_and_reads_session_id() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(
            Endpoint::GenerateTestCases,
            serde_json::json!({"message": "started", "session_id": "20250101_120000"}),
        );
        let id = fetcher(&transport)
            .generate_test_cases("http://x", 3)
            .await
            .unwrap();
        assert_eq!(id, Some(SessionId::new("20250101_120000")));
        let requests = transport.requests();
        assert_eq!(
            requests[0].1,
            Some(serde_json::json!({"url": "http://x", "num_test_cases": 3}))
        );
    }

    #[tokio::test]
    async fn generate_without_session_id_is_none() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(Endpoint::GenerateTestCases, serde_json::json!({"message": "ok"}));
        let id = fetcher(&transport)
            .generate_test_cases("http://x", 1)
            .await
            .unwrap();
        assert_eq!(id, None);
    }
}
