use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use testpilot_client::{Session, SessionFetcher, SessionId, Transport};
use tracing::{debug, info};

use crate::config::WorkbenchConfig;
use crate::errors::OrchestratorError;
use crate::execution::{ExecutionOrchestrator, ExecutionStart};
use crate::export::CsvExport;
use crate::generation::{GenerationOrchestrator, GenerationStart};
use crate::refresher::ListAutoRefresher;
use crate::view::{SharedView, ViewSnapshot, reload_sessions};

/// One view session: the shared view model plus every orchestrator that
/// mutates it.
///
/// All timers started through a workbench are cancelled by
/// [`Workbench::shutdown`], which also runs on drop.
pub struct Workbench {
    fetcher: SessionFetcher,
    view: SharedView,
    refresher: ListAutoRefresher,
    generation: GenerationOrchestrator,
    execution: ExecutionOrchestrator,
    config: WorkbenchConfig,
    closed: AtomicBool,
}

impl Workbench {
    /// Builds a workbench without loading anything.
    pub fn new(transport: Arc<dyn Transport>, config: WorkbenchConfig) -> Self {
        let fetcher = SessionFetcher::new(transport);
        let view = SharedView::new();
        let refresher =
            ListAutoRefresher::new(fetcher.clone(), view.clone(), config.refresh_poll());
        let generation = GenerationOrchestrator::new(
            fetcher.clone(),
            view.clone(),
            refresher.clone(),
            config.clone(),
        );
        let execution = ExecutionOrchestrator::new(
            fetcher.clone(),
            view.clone(),
            refresher.clone(),
            config.clone(),
        );
        Self {
            fetcher,
            view,
            refresher,
            generation,
            execution,
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Builds a workbench and loads the session list. A failed load is left
    /// on the view as its error message.
    pub async fn open(transport: Arc<dyn Transport>, config: WorkbenchConfig) -> Self {
        let workbench = Self::new(transport, config);
        let _ = workbench.refresh().await;
        workbench
    }

    /// Reloads the session list, keeping the selection if it still exists.
    pub async fn refresh(&self) -> Result<usize, OrchestratorError> {
        reload_sessions(&self.fetcher, &self.view).await
    }

    /// Selects `id`, preferring the full record from the server over the
    /// stored one. Unknown ids leave the selection untouched.
    pub async fn select(&self, id: &SessionId) -> Option<Session> {
        let stored = self.view.with(|v| v.store().find_by_id(id).cloned());
        let session = match self.fetcher.get_by_id(id).await {
            Some(full) => full,
            None => {
                debug!(event = "view.select_fallback", domain = "view", session_id = %id);
                stored?
            }
        };
        self.view.with(|v| v.select(session.clone()));
        Some(session)
    }

    pub async fn generate(
        &self,
        url: &str,
        count: u32,
    ) -> Result<GenerationStart, OrchestratorError> {
        self.generation.generate(url, count).await
    }

    pub async fn execute(&self, id: &SessionId) -> Result<ExecutionStart, OrchestratorError> {
        self.execution.execute(id).await
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.view.snapshot()
    }

    /// CSV for a stored session; `None` when the id is not in the list.
    pub fn export_csv(&self, id: &SessionId) -> Option<CsvExport> {
        self.view.with(|v| {
            v.selected()
                .filter(|s| &s.session_id == id)
                .or_else(|| v.store().find_by_id(id))
                .map(CsvExport::of)
        })
    }

    pub fn view(&self) -> &SharedView {
        &self.view
    }

    pub fn generation(&self) -> &GenerationOrchestrator {
        &self.generation
    }

    pub fn execution(&self) -> &ExecutionOrchestrator {
        &self.execution
    }

    pub fn refresher(&self) -> &ListAutoRefresher {
        &self.refresher
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancels both polls, the auto-refresher and its pending delayed stops.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.cancel();
        let execution = self.execution.cancel();
        self.refresher.shutdown();
        info!(
            event = "workbench.shutdown",
            domain = "workbench",
            generation_cancelled = generation,
            execution_cancelled = execution
        );
    }
}

impl Drop for Workbench {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use testpilot_client::testing::ScriptedTransport;
    use testpilot_client::{ClientError, Endpoint};

    use super::*;
    use crate::poll::PollState;

    fn sessions_payload() -> serde_json::Value {
        json!([
            { "session_id": "s2", "status": "Completed", "test_cases": [{ "test_id": 1, "status": "Pass" }] },
            { "session_id": "s1", "status": null }
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn open_loads_the_list() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(Endpoint::ListSessions, sessions_payload());
        let workbench = Workbench::open(transport.clone(), WorkbenchConfig::default()).await;

        let snap = workbench.snapshot();
        assert_eq!(snap.sessions.len(), 2);
        assert_eq!(snap.sessions[0].session_id.as_str(), "s2");
        assert_eq!(snap.error, None);
        assert!(!snap.auto_refreshing);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_surfaces_a_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(Endpoint::ListSessions, json!({ "sessions": [] }));
        let workbench = Workbench::open(transport, WorkbenchConfig::default()).await;
        let error = workbench.snapshot().error.unwrap_or_default();
        assert!(error.starts_with("failed to load sessions"), "{error}");
    }

    #[tokio::test(start_paused = true)]
    async fn select_prefers_the_full_record_and_falls_back() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_ok(Endpoint::ListSessions, sessions_payload())
            .respond_ok(
                Endpoint::GetSession("s1".into()),
                json!({
                    "session": { "session_id": "s1", "status": "In Progress" },
                    "test_cases": [{ "test_id": 1, "title": "t", "steps": ["a", "b"] }]
                }),
            )
            .respond(
                Endpoint::GetSession("s2".into()),
                Err(ClientError::fetch_failed(&Endpoint::GetSession("s2".into()), "boom", Some(500))),
            );
        let workbench = Workbench::open(transport, WorkbenchConfig::default()).await;

        let selected = workbench.select(&"s1".into()).await.unwrap();
        assert_eq!(selected.test_cases.len(), 1);
        assert_eq!(selected.test_cases[0].normalized_steps(), "1. a\n2. b");

        let selected = workbench.select(&"s2".into()).await.unwrap();
        assert_eq!(selected.status.as_str(), "Completed");
        assert_eq!(workbench.snapshot().selected, Some(selected));

        assert!(workbench.select(&"nope".into()).await.is_none());
        let snap = workbench.snapshot();
        assert_eq!(snap.selected.map(|s| s.session_id), Some("s2".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn export_uses_the_stored_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_ok(Endpoint::ListSessions, sessions_payload());
        let workbench = Workbench::open(transport, WorkbenchConfig::default()).await;

        let export = workbench.export_csv(&"s2".into()).unwrap();
        assert_eq!(export.file_name, "tests-s2.csv");
        assert_eq!(export.contents.lines().count(), 2);
        assert!(workbench.export_csv(&"missing".into()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_every_timer() {
        let transport = Arc::new(ScriptedTransport::new());
        let list = Endpoint::ListSessions;
        let get = Endpoint::GetSession("s1".into());
        transport
            .respond_ok(list.clone(), json!([{ "session_id": "s1" }]))
            .respond_ok(Endpoint::GenerateTestCases, json!({ "session_id": "s1" }))
            .respond_ok(Endpoint::ExecuteSession("s1".into()), json!({}))
            .respond_ok(get.clone(), json!({ "session": { "session_id": "s1" }, "test_cases": [] }));
        let workbench = Workbench::open(transport.clone(), WorkbenchConfig::default()).await;

        workbench.generate("http://x", 2).await.unwrap();
        workbench.execute(&"s1".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(workbench.generation().state(), PollState::Running);
        assert_eq!(workbench.execution().state(), PollState::Running);
        assert!(workbench.refresher().is_running());

        workbench.shutdown();
        workbench.shutdown();
        assert!(workbench.is_closed());
        assert_eq!(workbench.generation().state(), PollState::Idle);
        assert_eq!(workbench.execution().state(), PollState::Idle);
        assert!(!workbench.refresher().is_running());

        let before = transport.requests().len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.requests().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_every_timer() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_ok(Endpoint::ListSessions, json!([]))
            .respond_ok(Endpoint::ExecuteSession("s1".into()), json!({}))
            .respond_ok(
                Endpoint::GetSession("s1".into()),
                json!({ "session": { "session_id": "s1" }, "test_cases": [] }),
            );
        let workbench = Workbench::open(transport.clone(), WorkbenchConfig::default()).await;
        workbench.execute(&"s1".into()).await.unwrap();
        drop(workbench);

        let before = transport.requests().len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.requests().len(), before);
    }
}
