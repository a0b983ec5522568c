//! Polling orchestration for the test generation/execution service.
//!
//! A [`Workbench`] owns the view model and drives two long-running server
//! operations through the same bounded [`poll::Poller`]: test generation
//! (until the new session has test cases) and test execution (until every
//! case has a result). While either runs, a [`ListAutoRefresher`] keeps the
//! session list current. Every timer is cancelled on [`Workbench::shutdown`].

pub mod config;
pub mod errors;
pub mod execution;
pub mod export;
pub mod generation;
pub mod observability;
pub mod poll;
pub mod refresher;
pub mod stats;
/// In-memory session collection.
pub mod store;
pub mod view;
mod workbench;

pub use config::WorkbenchConfig;
pub use errors::{ConfigError, OrchestratorError};
pub use execution::{ExecutionOrchestrator, ExecutionStart, execution_complete};
pub use export::CsvExport;
pub use generation::{GenerationOrchestrator, GenerationStart, generation_ready};
pub use observability::init_observability;
pub use poll::{PollHandle, PollKind, PollSlot, PollSpec, PollState, Poller};
pub use refresher::ListAutoRefresher;
pub use stats::SessionStats;
pub use store::SessionStore;
pub use view::{SharedView, ViewModel, ViewSnapshot};
pub use workbench::Workbench;
