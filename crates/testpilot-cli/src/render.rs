//! Plain-text rendering of sessions and progress.

use std::fmt::Write as _;

use testpilot_client::{Session, TestStatus};
use testpilot_core::{PollKind, SessionStats, ViewSnapshot};

fn status_symbol(status: Option<&TestStatus>) -> char {
    match status {
        Some(TestStatus::Pass) => '✓',
        Some(TestStatus::Fail) => '✗',
        _ => '○',
    }
}

/// One line per session: id, status, counters and progress.
pub fn session_line(session: &Session) -> String {
    let stats = SessionStats::of(session);
    format!(
        "{:<18} {:<12} {:>3} tests  {:>3} pass  {:>3} fail  {:>3}%  {}",
        session.session_id,
        session.status,
        stats.total,
        stats.passed,
        stats.failed,
        stats.progress(),
        session.url.as_deref().unwrap_or("")
    )
}

pub fn session_list(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "no sessions\n".to_string();
    }
    let mut out = String::new();
    for session in sessions {
        out.push_str(&session_line(session));
        out.push('\n');
    }
    out
}

/// Session header followed by every test case with its numbered steps.
pub fn session_detail(session: &Session) -> String {
    let mut out = session_line(session);
    out.push('\n');
    if let Some(created) = &session.created_at {
        let _ = writeln!(out, "created: {created}");
    }
    for case in &session.test_cases {
        let id = case.test_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "\n{} [{}] {}",
            status_symbol(case.status.as_ref()),
            id,
            case.title
        );
        if !case.description.is_empty() {
            let _ = writeln!(out, "  {}", case.description);
        }
        for line in case.normalized_steps().lines() {
            let _ = writeln!(out, "    {line}");
        }
        if !case.comment.is_empty() {
            let _ = writeln!(out, "  comment: {}", case.comment);
        }
        if let Some(at) = &case.executed_at {
            let _ = writeln!(out, "  executed: {at}");
        }
    }
    out
}

/// Progress line for a running orchestration.
pub fn progress_line(kind: PollKind, snapshot: &ViewSnapshot, session: Option<&Session>) -> String {
    let mut line = format!("{kind}: ");
    match session {
        Some(session) => {
            let stats = SessionStats::of(session);
            let _ = write!(
                line,
                "{} {} ({} tests, {}% done)",
                session.session_id,
                session.status,
                stats.total,
                stats.progress()
            );
        }
        None => line.push_str("waiting for session"),
    }
    if snapshot.auto_refreshing {
        line.push_str(" [auto-refresh]");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpilot_client::TestCase;

    fn sample() -> Session {
        let mut session = Session::new("20240101_120000");
        session.url = Some("https://example.com".into());
        session.test_cases = vec![
            TestCase {
                test_id: Some(1),
                title: "Open home".into(),
                status: Some(TestStatus::Pass),
                steps: r#"["open /","check title"]"#.into(),
                ..TestCase::default()
            },
            TestCase {
                test_id: Some(2),
                title: "Log in".into(),
                ..TestCase::default()
            },
        ];
        session
    }

    #[test]
    fn line_has_counters() {
        let line = session_line(&sample());
        assert!(line.starts_with("20240101_120000"));
        assert!(line.contains("  2 tests"));
        assert!(line.contains(" 50%"));
        assert!(line.ends_with("https://example.com"));
    }

    #[test]
    fn detail_numbers_steps() {
        let detail = session_detail(&sample());
        assert!(detail.contains("✓ [1] Open home"));
        assert!(detail.contains("    1. open /\n    2. check title\n"));
        assert!(detail.contains("○ [2] Log in"));
    }

    #[test]
    fn progress_without_session() {
        let snapshot = ViewSnapshot {
            auto_refreshing: true,
            ..ViewSnapshot::default()
        };
        assert_eq!(
            progress_line(PollKind::Generation, &snapshot, None),
            "test generation: waiting for session [auto-refresh]"
        );
    }
}
