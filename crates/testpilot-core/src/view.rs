//! Shared view model mutated by the orchestrators and read by presentation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use testpilot_client::{Session, SessionFetcher, SessionId};
use tracing::{debug, warn};

use crate::errors::OrchestratorError;
use crate::store::SessionStore;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the view renders: the session list, the selection and the
/// progress/error flags of the running orchestrations.
#[derive(Debug, Default)]
pub struct ViewModel {
    store: SessionStore,
    selected: Option<Session>,
    generating: bool,
    executing: bool,
    generation_succeeded: bool,
    error: Option<String>,
    auto_refreshing: bool,
}

impl ViewModel {
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn sessions(&self) -> &[Session] {
        self.store.all()
    }

    pub fn selected(&self) -> Option<&Session> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, id: &SessionId) -> bool {
        self.selected.as_ref().is_some_and(|s| &s.session_id == id)
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn generation_succeeded(&self) -> bool {
        self.generation_succeeded
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.auto_refreshing
    }

    /// Replaces the list wholesale and re-resolves the selection against it.
    /// The selection is dropped when its session is gone.
    pub fn replace_sessions(&mut self, sessions: Vec<Session>) {
        self.store.replace_all(sessions);
        if let Some(selected) = self.selected.take() {
            self.selected = self.store.find_by_id(&selected.session_id).cloned();
            if self.selected.is_none() {
                debug!(
                    event = "view.selection_dropped",
                    domain = "view",
                    session_id = %selected.session_id
                );
            }
        }
    }

    pub fn upsert_session(&mut self, session: Session) {
        self.store.upsert(session);
    }

    pub fn select(&mut self, session: Session) {
        self.selected = Some(session);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Replaces the selected record if it is `session`.
    pub fn refresh_selection(&mut self, session: &Session) -> bool {
        if self.is_selected(&session.session_id) {
            self.selected = Some(session.clone());
            return true;
        }
        false
    }

    pub(crate) fn set_generating(&mut self, generating: bool) {
        self.generating = generating;
    }

    pub(crate) fn set_executing(&mut self, executing: bool) {
        self.executing = executing;
    }

    pub(crate) fn set_generation_succeeded(&mut self, succeeded: bool) {
        self.generation_succeeded = succeeded;
    }

    pub(crate) fn set_auto_refreshing(&mut self, enabled: bool) {
        self.auto_refreshing = enabled;
    }

    pub fn set_error(&mut self, error: &OrchestratorError) {
        self.error = Some(error.to_string());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            sessions: self.store.all().to_vec(),
            selected: self.selected.clone(),
            generating: self.generating,
            executing: self.executing,
            generation_succeeded: self.generation_succeeded,
            error: self.error.clone(),
            auto_refreshing: self.auto_refreshing,
        }
    }
}

/// Owned copy of the view model taken under one lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub sessions: Vec<Session>,
    pub selected: Option<Session>,
    pub generating: bool,
    pub executing: bool,
    pub generation_succeeded: bool,
    pub error: Option<String>,
    pub auto_refreshing: bool,
}

impl ViewSnapshot {
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.session_id == id)
    }
}

/// Cloneable handle to the view model.
///
/// Access goes through [`SharedView::with`], whose closure cannot await, so
/// the lock is never held across a suspension point.
#[derive(Debug, Clone, Default)]
pub struct SharedView {
    inner: Arc<Mutex<ViewModel>>,
}

impl SharedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ViewModel) -> R) -> R {
        f(&mut lock(&self.inner))
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.with(|view| view.snapshot())
    }

    pub fn surface(&self, error: &OrchestratorError) {
        warn!(event = "view.error", domain = "view", error = %error);
        self.with(|view| view.set_error(error));
    }
}

/// Loads the full list into the view. Failures are surfaced on the view and
/// returned.
pub(crate) async fn reload_sessions(
    fetcher: &SessionFetcher,
    view: &SharedView,
) -> Result<usize, OrchestratorError> {
    match fetcher.list_all().await {
        Ok(sessions) => {
            let count = sessions.len();
            view.with(|v| v.replace_sessions(sessions));
            debug!(event = "sessions.loaded", domain = "view", count = count as u64);
            Ok(count)
        }
        Err(err) => {
            let err = OrchestratorError::SessionList(err);
            view.surface(&err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpilot_client::SessionStatus;

    #[test]
    fn replace_re_resolves_selection() {
        let mut view = ViewModel::default();
        view.replace_sessions(vec![Session::new("a"), Session::new("b")]);
        view.select(Session::new("b"));

        let mut fresh_b = Session::new("b");
        fresh_b.status = SessionStatus::Completed;
        view.replace_sessions(vec![fresh_b.clone(), Session::new("c")]);
        assert_eq!(view.selected(), Some(&fresh_b));

        view.replace_sessions(vec![Session::new("c")]);
        assert_eq!(view.selected(), None);
    }

    #[test]
    fn refresh_selection_only_touches_the_selected_session() {
        let mut view = ViewModel::default();
        assert!(!view.refresh_selection(&Session::new("a")));
        assert!(view.selected().is_none());

        view.select(Session::new("a"));
        let mut updated = Session::new("a");
        updated.status = SessionStatus::Completed;
        assert!(view.refresh_selection(&updated));
        assert!(!view.refresh_selection(&Session::new("b")));
        assert_eq!(view.selected(), Some(&updated));
    }

    #[test]
    fn snapshot_copies_state() {
        let shared = SharedView::new();
        shared.with(|v| {
            v.upsert_session(Session::new("a"));
            v.set_executing(true);
        });
        shared.surface(&OrchestratorError::Validation("url must not be empty".into()));
        let snap = shared.snapshot();
        assert_eq!(snap.sessions.len(), 1);
        assert!(snap.executing);
        assert_eq!(snap.error.as_deref(), Some("invalid input: url must not be empty"));
        assert!(snap.session(&"a".into()).is_some());
    }
}
