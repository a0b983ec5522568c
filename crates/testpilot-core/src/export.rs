//! CSV export of one session's test cases.

use std::io;
use std::path::{Path, PathBuf};

use testpilot_client::{Session, TestCase, TestStatus};
use tracing::info;

const HEADER: &str = "Test ID,Title,Description,Status,Comment,Steps,Executed At";
const PENDING: &str = "Pending";

/// A rendered CSV document and the file name it is saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub contents: String,
}

impl CsvExport {
    /// Renders `session`: an unquoted header, then one row per test case with
    /// every field quoted. Rows end with `\n`.
    pub fn of(session: &Session) -> Self {
        let mut contents = String::from(HEADER);
        contents.push('\n');
        for case in &session.test_cases {
            push_row(&mut contents, case);
        }
        Self {
            file_name: format!("tests-{}.csv", session.session_id),
            contents,
        }
    }

    /// Writes the document into `dir` and returns the full path.
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.contents)?;
        info!(
            event = "export.written",
            domain = "export",
            path = %path.display(),
            bytes = self.contents.len() as u64
        );
        Ok(path)
    }
}

fn push_row(out: &mut String, case: &TestCase) {
    let test_id = case.test_id.map(|id| id.to_string()).unwrap_or_default();
    let status = case
        .status
        .as_ref()
        .map_or(PENDING, TestStatus::as_str);
    let fields = [
        test_id.as_str(),
        case.title.as_str(),
        case.description.as_str(),
        status,
        case.comment.as_str(),
        case.steps.as_str(),
        case.executed_at.as_deref().unwrap_or_default(),
    ];
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    }
    out.push('\n');
}
