//! Test generation: trigger, then poll the new session until its test cases
//! appear.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};

use testpilot_client::{Session, SessionFetcher, SessionId};
use tracing::{info, warn};

use crate::config::WorkbenchConfig;
use crate::errors::OrchestratorError;
use crate::poll::{PollKind, PollSlot, PollState, Poller, wait_terminal};
use crate::refresher::ListAutoRefresher;
use crate::view::{SharedView, lock, reload_sessions};

/// Generation is done once the session exists and has at least one test case.
pub fn generation_ready(session: Option<&Session>) -> bool {
    session.is_some_and(Session::has_test_cases)
}

/// How a `generate` call left things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStart {
    /// Polling the new session.
    Polling(SessionId),
    /// The server returned no session id; treated as an immediate success.
    NoSession,
    /// A newer `generate` or a cancellation superseded this one.
    Superseded,
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: SessionFetcher,
    view: SharedView,
    refresher: ListAutoRefresher,
    config: WorkbenchConfig,
    slot: Mutex<PollSlot>,
}

impl GenerationOrchestrator {
    pub fn new(
        fetcher: SessionFetcher,
        view: SharedView,
        refresher: ListAutoRefresher,
        config: WorkbenchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                view,
                refresher,
                config,
                slot: Mutex::new(PollSlot::new(PollKind::Generation)),
            }),
        }
    }

    /// Requests `count` test cases for `url` and starts polling the session
    /// the server creates for them.
    ///
    /// Invalid input is surfaced on the view and returned without contacting
    /// the server. A call made while another generation is polling cancels
    /// that poll.
    pub async fn generate(
        &self,
        url: &str,
        count: u32,
    ) -> Result<GenerationStart, OrchestratorError> {
        let inner = &self.inner;
        let url = url.trim();
        if let Err(err) = validate(url, count) {
            inner.view.surface(&err);
            return Err(err);
        }

        let generation = lock(&inner.slot).begin();
        inner.view.with(|v| {
            v.set_generating(true);
            v.set_generation_succeeded(false);
            v.clear_error();
        });
        inner.refresher.start();
        info!(event = "generation.requested", domain = "generation", url, count, generation);

        let requested = inner.fetcher.generate_test_cases(url, count).await;
        if !lock(&inner.slot).is_current(generation) {
            return Ok(GenerationStart::Superseded);
        }
        let session_id = match requested {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(
                    event = "generation.no_session_id",
                    domain = "generation",
                    generation
                );
                inner.view.with(|v| {
                    v.set_generating(false);
                    v.set_generation_succeeded(true);
                });
                inner.refresher.stop_after(inner.config.generation_grace());
                return Ok(GenerationStart::NoSession);
            }
            Err(err) => {
                let err = OrchestratorError::Generation(err);
                inner.view.surface(&err);
                inner.view.with(|v| v.set_generating(false));
                inner.refresher.stop();
                return Err(err);
            }
        };

        // The list error, if any, is already on the view; polling goes on.
        let _ = reload_sessions(&inner.fetcher, &inner.view).await;

        let handle = self.poller(generation, session_id.clone()).start();
        if !lock(&inner.slot).install(generation, handle) {
            return Ok(GenerationStart::Superseded);
        }
        Ok(GenerationStart::Polling(session_id))
    }

    fn poller(&self, generation: u64, polled_id: SessionId) -> Poller<Option<Session>> {
        let spec = self.inner.config.generation_poll();
        let fetcher = self.inner.fetcher.clone();
        let on_tick = Arc::downgrade(&self.inner);
        let on_complete = on_tick.clone();
        let on_timeout = on_tick.clone();
        Poller::new(PollKind::Generation, spec, move || {
            let fetcher = fetcher.clone();
            let id = polled_id.clone();
            async move { fetcher.get_by_id(&id).await }
        })
        .generation(generation)
        .on_tick(move |result: &Option<Session>| {
            let Some(inner) = on_tick.upgrade() else {
                return ControlFlow::Break(());
            };
            let slot = lock(&inner.slot);
            if !slot.is_current(generation) {
                return ControlFlow::Break(());
            }
            if let Some(session) = result {
                inner.view.with(|v| v.upsert_session(session.clone()));
            }
            ControlFlow::Continue(())
        })
        .is_done(|result: &Option<Session>| generation_ready(result.as_ref()))
        .on_complete(move |result| finish(&on_complete, generation, result))
        .on_timeout(move || {
            let Some(inner) = on_timeout.upgrade() else {
                return;
            };
            let slot = lock(&inner.slot);
            if !slot.is_current(generation) {
                return;
            }
            let err = OrchestratorError::Timeout {
                kind: PollKind::Generation,
                attempts: spec.max_attempts.unwrap_or_default(),
            };
            inner.view.surface(&err);
            inner.view.with(|v| v.set_generating(false));
            drop(slot);
            inner.refresher.stop_after(inner.config.timeout_grace());
        })
    }

    /// Waits until the current generation poll settles. `Idle` when none was
    /// started.
    pub async fn wait(&self) -> PollState {
        let Some(rx) = lock(&self.inner.slot).subscribe() else {
            return PollState::Idle;
        };
        wait_terminal(rx).await
    }

    pub fn state(&self) -> PollState {
        lock(&self.inner.slot).state()
    }

    /// Cancels the running generation poll, clears the in-progress flag and
    /// stops the list refresh the run started.
    pub fn cancel(&self) -> bool {
        let cancelled = lock(&self.inner.slot).cancel();
        self.inner.view.with(|v| v.set_generating(false));
        self.inner.refresher.stop();
        cancelled
    }
}

fn validate(url: &str, count: u32) -> Result<(), OrchestratorError> {
    if url.is_empty() {
        return Err(OrchestratorError::Validation("url must not be empty".into()));
    }
    if count < 1 {
        return Err(OrchestratorError::Validation(
            "number of test cases must be at least 1".into(),
        ));
    }
    Ok(())
}

fn finish(inner: &Weak<Inner>, generation: u64, result: Option<Session>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let slot = lock(&inner.slot);
    if !slot.is_current(generation) {
        return;
    }
    if let Some(session) = result {
        info!(
            event = "generation.completed",
            domain = "generation",
            session_id = %session.session_id,
            test_cases = session.test_cases.len() as u64
        );
        inner.view.with(|v| {
            v.upsert_session(session.clone());
            v.select(session);
        });
    }
    inner.view.with(|v| {
        v.set_generating(false);
        v.set_generation_succeeded(true);
    });
    drop(slot);
    inner.refresher.stop_after(inner.config.generation_grace());
}
