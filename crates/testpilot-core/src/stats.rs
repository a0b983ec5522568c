use serde::Serialize;
use testpilot_client::{Session, TestStatus};

/// Per-session outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Absent or `Pending` statuses.
    pub pending: usize,
}

impl SessionStats {
    pub fn of(session: &Session) -> Self {
        let mut stats = Self {
            total: session.test_cases.len(),
            ..Self::default()
        };
        for case in &session.test_cases {
            match case.status {
                Some(TestStatus::Pass) => stats.passed += 1,
                Some(TestStatus::Fail) => stats.failed += 1,
                Some(TestStatus::Pending) | None => stats.pending += 1,
                Some(TestStatus::Other(_)) => {}
            }
        }
        stats
    }

    /// Percentage of cases that passed or failed, rounded; 0 when empty.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = (self.passed + self.failed) as f64;
        (done / self.total as f64 * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpilot_client::TestCase;

    fn session(statuses: &[Option<TestStatus>]) -> Session {
        let mut session = Session::new("s");
        session.test_cases = statuses
            .iter()
            .map(|status| TestCase {
                status: status.clone(),
                ..TestCase::default()
            })
            .collect();
        session
    }

    #[test]
    fn counts_and_progress() {
        let stats = SessionStats::of(&session(&[
            Some(TestStatus::Pass),
            Some(TestStatus::Fail),
            Some(TestStatus::Pending),
        ]));
        assert_eq!(
            stats,
            SessionStats {
                total: 3,
                passed: 1,
                failed: 1,
                pending: 1
            }
        );
        assert_eq!(stats.progress(), 67);
    }

    #[test]
    fn absent_status_is_pending_and_empty_is_zero() {
        let stats = SessionStats::of(&session(&[None, Some(TestStatus::Pass)]));
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.progress(), 50);
        assert_eq!(SessionStats::of(&Session::new("e")).progress(), 0);
    }
}
