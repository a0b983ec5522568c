use testpilot_client::{Session, SessionId};

/// Ordered in-memory collection of sessions keyed by session id.
///
/// Records are only ever replaced whole. New sessions are prepended; an
/// existing session keeps its position when replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStore {
    sessions: Vec<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the record with the same id in place, or inserts at the front.
    pub fn upsert(&mut self, session: Session) {
        match self.position(&session.session_id) {
            Some(index) => self.sessions[index] = session,
            None => self.sessions.insert(0, session),
        }
    }

    /// Replaces the whole list (server order is kept).
    pub fn replace_all(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
    }

    pub fn all(&self) -> &[Session] {
        &self.sessions
    }

    pub fn find_by_id(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.session_id == id)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, id: &SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| &s.session_id == id)
    }
}
