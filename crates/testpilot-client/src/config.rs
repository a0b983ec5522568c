use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_USER_AGENT: &str = concat!("testpilot/", env!("CARGO_PKG_VERSION"));

/// Configuration for the REST client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Service root; endpoints are resolved under `{base_url}/api/`.
    pub base_url: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates a config for the given service root.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Builds a config from `TESTPILOT_API_BASE` and `TESTPILOT_HTTP_TIMEOUT_MS`.
    ///
    /// Both are optional; an unparsable timeout is a config error.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("TESTPILOT_API_BASE")
            && !base.trim().is_empty()
        {
            config.base_url = base.trim().to_string();
        }
        if let Ok(raw) = std::env::var("TESTPILOT_HTTP_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("invalid TESTPILOT_HTTP_TIMEOUT_MS: {raw:?}"))
            })?;
            config.timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Overrides the service root.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Builds the absolute URL for the given `/api` path segments.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(self.base_url.trim())
            .map_err(|e| ClientError::Config(format!("invalid base url {:?}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }
}
