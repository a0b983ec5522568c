use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "testpilot.logs.jsonl";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogSink {
    /// JSONL appended to a file.
    JsonFile { dir: PathBuf, file_name: String },
    /// Compact human-readable lines on stderr, keeping stdout for command output.
    Console,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn logging_enabled() -> bool {
    ["TESTPILOT_OBSERVABILITY_ENABLED", "TESTPILOT_OBSERVABILITY"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok())
        .map_or(true, |value| parse_flag(&value).unwrap_or(true))
}

fn env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var("TESTPILOT_LOG_LEVEL")
        && let Ok(filter) = EnvFilter::try_new(level)
    {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn sink_for(path: Option<&str>) -> LogSink {
    let Some(raw) = path.map(str::trim).filter(|p| !p.is_empty()) else {
        return LogSink::Console;
    };
    let path = Path::new(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogSink::JsonFile { dir, file_name }
}

/// Installs the process-wide tracing subscriber. Later calls are no-ops.
///
/// Environment variables:
/// - `TESTPILOT_OBSERVABILITY_ENABLED` / `TESTPILOT_OBSERVABILITY`: enable/disable flag (default enabled).
/// - `TESTPILOT_LOG_LEVEL`: level/filter override (`info`, `testpilot_core=debug`, ...).
/// - `RUST_LOG`: filter, used when `TESTPILOT_LOG_LEVEL` is unset or invalid.
/// - `TESTPILOT_JSON_LOG_PATH`: when set, records are written as JSONL to that file
///   instead of the console.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !logging_enabled() {
            return;
        }
        let filter = env_filter();
        match sink_for(std::env::var("TESTPILOT_JSON_LOG_PATH").ok().as_deref()) {
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogSink::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert_eq!(parse_flag(" Enabled "), Some(true));
        assert_eq!(parse_flag("OFF"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn sink_resolution() {
        assert_eq!(sink_for(None), LogSink::Console);
        assert_eq!(sink_for(Some("  ")), LogSink::Console);
        assert_eq!(
            sink_for(Some("logs/run.jsonl")),
            LogSink::JsonFile {
                dir: PathBuf::from("logs"),
                file_name: "run.jsonl".into()
            }
        );
        assert_eq!(
            sink_for(Some("run.jsonl")),
            LogSink::JsonFile {
                dir: PathBuf::from("."),
                file_name: "run.jsonl".into()
            }
        );
    }

    #[test]
    fn init_twice_is_harmless() {
        init_observability();
        init_observability();
    }
}
