//! Scripted in-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::errors::ClientError;
use crate::transport::Transport;

type Response = Result<Value, ClientError>;

/// Answers each endpoint from a queue of scripted responses.
///
/// Responses are consumed in order; the last one sticks and answers every
/// later request. Endpoints with no script fail with a 404 `FetchFailed`.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<Endpoint, VecDeque<Response>>>,
    requests: Mutex<Vec<(Endpoint, Option<Value>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `endpoint`.
    pub fn respond(&self, endpoint: Endpoint, response: Response) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(endpoint)
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond_ok(&self, endpoint: Endpoint, value: Value) -> &Self {
        self.respond(endpoint, Ok(value))
    }

    /// Number of requests sent to `endpoint` so far.
    pub fn calls(&self, endpoint: &Endpoint) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|(sent, _)| sent == endpoint)
            .count()
    }

    /// Every request in the order it was sent.
    pub fn requests(&self) -> Vec<(Endpoint, Option<Value>)> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, endpoint: &Endpoint, body: Option<Value>) -> Result<Value, ClientError> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((endpoint.clone(), body));
        let mut routes = self
            .routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(queue) = routes.get_mut(endpoint) else {
            return Err(ClientError::fetch_failed(
                endpoint,
                "no scripted response",
                Some(404),
            ));
        };
        match queue.len() {
            0 => Err(ClientError::fetch_failed(endpoint, "no scripted response", Some(404))),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| {
                Err(ClientError::fetch_failed(endpoint, "no scripted response", Some(404)))
            }),
        }
    }
}
