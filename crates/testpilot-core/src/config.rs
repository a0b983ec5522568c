use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::poll::PollSpec;

/// Poll timings and budgets for a workbench. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    /// Period of the generation and execution polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 36 attempts at 5s is a 180s budget.
    #[serde(default = "default_generation_max_attempts")]
    pub generation_max_attempts: u32,
    /// 120 attempts at 5s is a 600s budget.
    #[serde(default = "default_execution_max_attempts")]
    pub execution_max_attempts: u32,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Delay before list refresh stops after generation succeeds.
    #[serde(default = "default_generation_grace_ms")]
    pub generation_grace_ms: u64,
    /// Delay before list refresh stops after execution completes.
    #[serde(default = "default_execution_grace_ms")]
    pub execution_grace_ms: u64,
    /// Delay before list refresh stops after a timeout or a fatal poll error.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_generation_max_attempts() -> u32 {
    36
}

const fn default_execution_max_attempts() -> u32 {
    120
}

const fn default_refresh_interval_ms() -> u64 {
    5_000
}

const fn default_generation_grace_ms() -> u64 {
    10_000
}

const fn default_execution_grace_ms() -> u64 {
    2_000
}

const fn default_timeout_grace_ms() -> u64 {
    1_000
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            generation_max_attempts: default_generation_max_attempts(),
            execution_max_attempts: default_execution_max_attempts(),
            refresh_interval_ms: default_refresh_interval_ms(),
            generation_grace_ms: default_generation_grace_ms(),
            execution_grace_ms: default_execution_grace_ms(),
            timeout_grace_ms: default_timeout_grace_ms(),
        }
    }
}

impl WorkbenchConfig {
    /// Defaults overridden by any of:
    /// `TESTPILOT_POLL_INTERVAL_MS`, `TESTPILOT_GENERATION_MAX_ATTEMPTS`,
    /// `TESTPILOT_EXECUTION_MAX_ATTEMPTS`, `TESTPILOT_REFRESH_INTERVAL_MS`,
    /// `TESTPILOT_GENERATION_GRACE_MS`, `TESTPILOT_EXECUTION_GRACE_MS`,
    /// `TESTPILOT_TIMEOUT_GRACE_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        override_from_env("TESTPILOT_POLL_INTERVAL_MS", &mut config.poll_interval_ms)?;
        override_from_env(
            "TESTPILOT_GENERATION_MAX_ATTEMPTS",
            &mut config.generation_max_attempts,
        )?;
        override_from_env(
            "TESTPILOT_EXECUTION_MAX_ATTEMPTS",
            &mut config.execution_max_attempts,
        )?;
        override_from_env("TESTPILOT_REFRESH_INTERVAL_MS", &mut config.refresh_interval_ms)?;
        override_from_env("TESTPILOT_GENERATION_GRACE_MS", &mut config.generation_grace_ms)?;
        override_from_env("TESTPILOT_EXECUTION_GRACE_MS", &mut config.execution_grace_ms)?;
        override_from_env("TESTPILOT_TIMEOUT_GRACE_MS", &mut config.timeout_grace_ms)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero intervals and zero attempt budgets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64); 4] = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("generation_max_attempts", self.generation_max_attempts.into()),
            ("execution_max_attempts", self.execution_max_attempts.into()),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError {
                    key,
                    value: value.to_string(),
                    reason: "must be greater than 0".into(),
                });
            }
        }
        Ok(())
    }

    pub fn generation_poll(&self) -> PollSpec {
        PollSpec::bounded(
            Duration::from_millis(self.poll_interval_ms),
            self.generation_max_attempts,
        )
    }

    pub fn execution_poll(&self) -> PollSpec {
        PollSpec::bounded(
            Duration::from_millis(self.poll_interval_ms),
            self.execution_max_attempts,
        )
    }

    pub fn refresh_poll(&self) -> PollSpec {
        PollSpec::unbounded(Duration::from_millis(self.refresh_interval_ms))
    }

    pub fn generation_grace(&self) -> Duration {
        Duration::from_millis(self.generation_grace_ms)
    }

    pub fn execution_grace(&self) -> Duration {
        Duration::from_millis(self.execution_grace_ms)
    }

    pub fn timeout_grace(&self) -> Duration {
        Duration::from_millis(self.timeout_grace_ms)
    }
}

fn override_from_env<T: std::str::FromStr>(key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(());
    };
    if raw.trim().is_empty() {
        return Ok(());
    }
    *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.generation_poll().budget(), Some(Duration::from_secs(180)));
        assert_eq!(config.execution_poll().budget(), Some(Duration::from_secs(600)));
        assert_eq!(config.refresh_poll().max_attempts, None);
        assert_eq!(config.generation_grace(), Duration::from_secs(10));
        assert_eq!(config.execution_grace(), Duration::from_secs(2));
        assert_eq!(config.timeout_grace(), Duration::from_secs(1));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: WorkbenchConfig =
            serde_json::from_str(r#"{"poll_interval_ms": 250, "execution_max_attempts": 4}"#)
                .unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.execution_max_attempts, 4);
        assert_eq!(config.generation_max_attempts, 36);
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let config = WorkbenchConfig {
            generation_max_attempts: 0,
            ..WorkbenchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.key, "generation_max_attempts");
    }
}
