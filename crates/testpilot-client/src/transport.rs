use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::endpoint::{Endpoint, Method};
use crate::errors::ClientError;

/// HTTP transport abstraction. The fetcher only sees JSON values, so payload
/// normalization can be exercised against scripted responses.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request to `endpoint` and returns the decoded body.
    ///
    /// Non-success statuses and I/O failures are `ClientError::FetchFailed`.
    /// An empty body decodes to `Value::Null`; a non-JSON body is returned as
    /// `Value::String` so callers decide whether the shape is acceptable.
    async fn send(&self, endpoint: &Endpoint, body: Option<Value>) -> Result<Value, ClientError>;
}

/// Default transport using the async reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport from `TESTPILOT_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, endpoint: &Endpoint, body: Option<Value>) -> Result<Value, ClientError> {
        let url = self.config.api_url(&endpoint.segments())?;
        debug!(
            event = "http.request",
            domain = "http",
            method = endpoint.method().as_str(),
            url = %url
        );
        let mut request = match endpoint.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::fetch_failed(endpoint, e.to_string(), None))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::fetch_failed(endpoint, e.to_string(), Some(status.as_u16())))?;
        if !status.is_success() {
            debug!(
                event = "http.request_failed",
                domain = "http",
                status = status.as_u16(),
                body_len = text.len() as u64
            );
            return Err(ClientError::fetch_failed(
                endpoint,
                format!("status={} body={}", status.as_u16(), text.trim()),
                Some(status.as_u16()),
            ));
        }
        Ok(decode_body(&text))
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
