//! Test execution: trigger, then poll the session until every test case has
//! a result or the server marks the session completed.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};

use testpilot_client::{Session, SessionFetcher, SessionId, TestCase};
use tracing::{info, warn};

use crate::config::WorkbenchConfig;
use crate::errors::OrchestratorError;
use crate::poll::{PollKind, PollSlot, PollState, Poller, wait_terminal};
use crate::refresher::ListAutoRefresher;
use crate::view::{SharedView, lock};

/// True when the server reports the session completed (any casing), or when
/// it has test cases and each one has a non-pending status.
///
/// A session with no test cases is never complete through the second rule.
pub fn execution_complete(session: &Session) -> bool {
    session.status.is_completed()
        || (session.has_test_cases() && session.test_cases.iter().all(TestCase::is_terminal))
}

/// How an `execute` call left things.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStart {
    /// Trigger accepted; the session is being polled.
    Started,
    /// Another execution is in progress; nothing was sent.
    AlreadyRunning,
    /// Cancelled while the trigger request was in flight.
    Cancelled,
}

#[derive(Clone)]
pub struct ExecutionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: SessionFetcher,
    view: SharedView,
    refresher: ListAutoRefresher,
    config: WorkbenchConfig,
    slot: Mutex<PollSlot>,
}

/// What an execution tick decided, applied once the slot lock is released.
enum TickOutcome {
    Stale,
    Missing,
    Updated,
}

impl ExecutionOrchestrator {
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
                slot: Mutex::new(PollSlot::new(PollKind::Execution)),
            }),
        }
    }

    /// Starts executing the tests of `session_id` and polls it until done.
    ///
    /// Does nothing while another execution is in progress.
    pub async fn execute(
        &self,
        session_id: &SessionId,
    ) -> Result<ExecutionStart, OrchestratorError> {
        let inner = &self.inner;
        let claimed = inner.view.with(|v| {
            if v.is_executing() {
                return false;
            }
            v.set_executing(true);
            v.clear_error();
            true
        });
        if !claimed {
            info!(
                event = "execution.already_running",
                domain = "execution",
                session_id = %session_id
            );
            return Ok(ExecutionStart::AlreadyRunning);
        }

        let generation = lock(&inner.slot).begin();
        inner.refresher.start();
        info!(
            event = "execution.requested",
            domain = "execution",
            session_id = %session_id,
            generation
        );

        let triggered = inner.fetcher.execute_session(session_id).await;
        if !lock(&inner.slot).is_current(generation) {
            return Ok(ExecutionStart::Cancelled);
        }
        if let Err(err) = triggered {
            let err = OrchestratorError::Execution(err);
            inner.view.surface(&err);
            inner.view.with(|v| v.set_executing(false));
            inner.refresher.stop();
            return Err(err);
        }

        let handle = self.poller(generation, session_id.clone()).start();
        if !lock(&inner.slot).install(generation, handle) {
            return Ok(ExecutionStart::Cancelled);
        }
        Ok(ExecutionStart::Started)
    }

    fn poller(&self, generation: u64, session_id: SessionId) -> Poller<Option<Session>> {
        let spec = self.inner.config.execution_poll();
        let fetcher = self.inner.fetcher.clone();
        let polled_id = session_id.clone();
        let on_tick = Arc::downgrade(&self.inner);
        let on_complete = on_tick.clone();
        let on_timeout = on_tick.clone();
        Poller::new(PollKind::Execution, spec, move || {
            let fetcher = fetcher.clone();
            let id = polled_id.clone();
            async move { fetcher.get_by_id(&id).await }
        })
        .generation(generation)
        .on_tick(move |result: &Option<Session>| {
            apply_tick(&on_tick, generation, &session_id, result)
        })
        .is_done(|result: &Option<Session>| result.as_ref().is_some_and(execution_complete))
        .on_complete(move |_| {
            settle(&on_complete, generation, None, |config| config.execution_grace())
        })
        .on_timeout(move || {
            let err = OrchestratorError::Timeout {
                kind: PollKind::Execution,
                attempts: spec.max_attempts.unwrap_or_default(),
            };
            settle(&on_timeout, generation, Some(err), |config| config.timeout_grace())
        })
    }

    /// Waits until the current execution poll settles. `Idle` when none was
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

    /// Cancels the running execution poll, clears the in-progress flag and
    /// stops the list refresh the run started.
    pub fn cancel(&self) -> bool {
        let cancelled = lock(&self.inner.slot).cancel();
        self.inner.view.with(|v| v.set_executing(false));
        self.inner.refresher.stop();
        cancelled
    }
}

fn apply_tick(
    inner: &Weak<Inner>,
    generation: u64,
    session_id: &SessionId,
    result: &Option<Session>,
) -> ControlFlow<()> {
    let Some(inner) = inner.upgrade() else {
        return ControlFlow::Break(());
    };
    let slot = lock(&inner.slot);
    let outcome = if !slot.is_current(generation) {
        TickOutcome::Stale
    } else if let Some(session) = result {
        inner.view.with(|v| {
            v.upsert_session(session.clone());
            v.refresh_selection(session);
        });
        TickOutcome::Updated
    } else {
        let err = OrchestratorError::NotFound(session_id.clone());
        inner.view.surface(&err);
        inner.view.with(|v| v.set_executing(false));
        TickOutcome::Missing
    };
    drop(slot);

    match outcome {
        TickOutcome::Updated => ControlFlow::Continue(()),
        TickOutcome::Stale => ControlFlow::Break(()),
        TickOutcome::Missing => {
            warn!(
                event = "execution.session_missing",
                domain = "execution",
                session_id = %session_id,
                generation
            );
            inner.refresher.stop_after(inner.config.timeout_grace());
            ControlFlow::Break(())
        }
    }
}

/// Clears the in-progress flag, surfaces `error` if any and schedules the
/// refresher stop.
fn settle(
    inner: &Weak<Inner>,
    generation: u64,
    error: Option<OrchestratorError>,
    grace: impl FnOnce(&WorkbenchConfig) -> std::time::Duration,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let slot = lock(&inner.slot);
    if !slot.is_current(generation) {
        return;
    }
    if let Some(err) = &error {
        inner.view.surface(err);
    }
    inner.view.with(|v| v.set_executing(false));
    drop(slot);
    inner.refresher.stop_after(grace(&inner.config));
}
