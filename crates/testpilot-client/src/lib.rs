//! Client side of the test generation/execution service.
//!
//! The service generates test cases for a URL and executes them in the
//! background; this crate only talks to its REST API and normalizes what it
//! returns. Polling and reconciliation live in `testpilot-core`.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use testpilot_client::{ClientConfig, ReqwestTransport, SessionFetcher};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), testpilot_client::ClientError> {
//! let transport = ReqwestTransport::new(ClientConfig::new("http://localhost:8000"))?;
//! let fetcher = SessionFetcher::new(Arc::new(transport));
//! for session in fetcher.list_all().await? {
//!     println!("{} {}", session.session_id, session.status);
//! }
//! # Ok(())
//! # }
//! ```

/// Client configuration (base URL, timeout).
pub mod config;
/// REST endpoints consumed by the client.
pub mod endpoint;
/// Error types for transport and payload failures.
pub mod errors;
pub mod fetcher;
/// Session and test case records.
pub mod model;
pub mod steps;
/// Transport trait and the reqwest implementation.
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ClientConfig;
pub use endpoint::{Endpoint, Method};
pub use errors::ClientError;
pub use fetcher::SessionFetcher;
pub use model::{Session, SessionId, SessionStatus, TestCase, TestStatus};
pub use steps::normalize_steps;
pub use transport::{ReqwestTransport, Transport};
