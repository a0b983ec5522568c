//! Background refresh of the whole session list while an orchestration runs.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use testpilot_client::{ClientError, Session, SessionFetcher};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::poll::{PollKind, PollSlot, PollSpec, PollState, Poller};
use crate::view::{SharedView, lock};

/// Periodically replaces the view's session list.
///
/// Orchestrators call [`ListAutoRefresher::start`] when they begin and
/// schedule [`ListAutoRefresher::stop_after`] when they finish. A delayed stop
/// only applies to the run that was active when it was scheduled.
#[derive(Clone)]
pub struct ListAutoRefresher {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: SessionFetcher,
    view: SharedView,
    spec: PollSpec,
    slot: Mutex<PollSlot>,
    pending_stops: Mutex<Vec<JoinHandle<()>>>,
}

impl ListAutoRefresher {
    pub fn new(fetcher: SessionFetcher, view: SharedView, spec: PollSpec) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                view,
                spec,
                slot: Mutex::new(PollSlot::new(PollKind::ListRefresh)),
                pending_stops: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts refreshing, restarting the timer if it was already running.
    pub fn start(&self) {
        let mut slot = lock(&self.inner.slot);
        let generation = slot.begin();
        let fetcher = self.inner.fetcher.clone();
        let weak = Arc::downgrade(&self.inner);
        let handle = Poller::new(PollKind::ListRefresh, self.inner.spec, move || {
            let fetcher = fetcher.clone();
            async move { fetcher.list_all().await }
        })
        .generation(generation)
        .on_tick(move |result: &Result<Vec<Session>, ClientError>| {
            apply_tick(&weak, generation, result)
        })
        .start();
        slot.install(generation, handle);
        drop(slot);
        self.inner.view.with(|v| v.set_auto_refreshing(true));
    }

    /// Stops refreshing now.
    pub fn stop(&self) {
        let mut slot = lock(&self.inner.slot);
        let was_running = slot.cancel();
        drop(slot);
        self.inner.view.with(|v| v.set_auto_refreshing(false));
        if was_running {
            debug!(event = "refresh.stopped", domain = "refresh");
        }
    }

    /// Stops the current run after `delay`, unless a `start` or `stop`
    /// happens first. A zero delay stops immediately.
    pub fn stop_after(&self, delay: Duration) {
        if delay.is_zero() {
            self.stop();
            return;
        }
        let generation = lock(&self.inner.slot).generation();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut slot = lock(&inner.slot);
            if !slot.is_current(generation) {
                debug!(event = "refresh.delayed_stop_skipped", domain = "refresh", generation);
                return;
            }
            slot.cancel();
            drop(slot);
            inner.view.with(|v| v.set_auto_refreshing(false));
            debug!(event = "refresh.stopped", domain = "refresh", generation);
        });
        let mut pending = lock(&self.inner.pending_stops);
        pending.retain(|stop| !stop.is_finished());
        pending.push(task);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.slot).state() == PollState::Running
    }

    pub fn spec(&self) -> PollSpec {
        self.inner.spec
    }

    /// Stops refreshing and drops every pending delayed stop.
    pub fn shutdown(&self) {
        self.stop();
        let pending: Vec<_> = lock(&self.inner.pending_stops).drain(..).collect();
        for task in &pending {
            task.abort();
        }
        info!(
            event = "refresh.shutdown",
            domain = "refresh",
            pending_stops = pending.len() as u64
        );
    }
}

fn apply_tick(
    inner: &Weak<Inner>,
    generation: u64,
    result: &Result<Vec<Session>, ClientError>,
) -> ControlFlow<()> {
    let Some(inner) = inner.upgrade() else {
        return ControlFlow::Break(());
    };
    let slot = lock(&inner.slot);
    if !slot.is_current(generation) {
        return ControlFlow::Break(());
    }
    match result {
        Ok(sessions) => {
            inner.view.with(|v| v.replace_sessions(sessions.clone()));
            debug!(
                event = "refresh.tick",
                domain = "refresh",
                generation,
                sessions = sessions.len() as u64
            );
        }
        Err(err) if err.is_malformed() => {
            inner.view.surface(&OrchestratorError::SessionList(err.clone()));
        }
        Err(err) => {
            warn!(
                event = "refresh.fetch_failed",
                domain = "refresh",
                generation,
                error = %err
            );
        }
    }
    drop(slot);
    ControlFlow::Continue(())
}
