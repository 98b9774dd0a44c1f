use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// What happens to tasks still in the ready queue when shutdown begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Workers keep dequeuing until the queue is empty, then exit.
    #[default]
    Drain,
    /// Queued tasks are removed and resolved as abandoned without running.
    Abandon,
}

impl FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "abandon" => Ok(Self::Abandon),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drain => f.write_str("drain"),
            Self::Abandon => f.write_str("abandon"),
        }
    }
}

/// Scheduler configuration, from defaults, TOML, or `TASKPOOL_*` env vars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    /// Backlog handling at shutdown.
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Log failed handles that are dropped without anyone reading the outcome.
    #[serde(default = "default_log_unobserved")]
    pub log_unobserved_failures: bool,
}

fn default_thread_name_prefix() -> String { "taskpool-worker".into() }
fn default_log_unobserved() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            shutdown_policy: ShutdownPolicy::default(),
            thread_name_prefix: default_thread_name_prefix(),
            log_unobserved_failures: default_log_unobserved(),
        }
    }
}

const ENV_WORKER_THREADS: &str = "TASKPOOL_WORKER_THREADS";
const ENV_SHUTDOWN_POLICY: &str = "TASKPOOL_SHUTDOWN_POLICY";
const ENV_THREAD_NAME_PREFIX: &str = "TASKPOOL_THREAD_NAME_PREFIX";
const ENV_LOG_UNOBSERVED: &str = "TASKPOOL_LOG_UNOBSERVED_FAILURES";

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key: key.to_string(), value })
}

impl SchedulerConfig {
    /// Config with a fixed worker count and defaults elsewhere.
    pub fn with_workers(worker_threads: usize) -> Self {
        Self { worker_threads, ..Self::default() }
    }

    /// Build config from environment variables (call `load_dotenv()` first).
    /// Unset keys keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply any `TASKPOOL_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_opt(ENV_WORKER_THREADS) {
            self.worker_threads = parse_env(ENV_WORKER_THREADS, v)?;
        }
        if let Some(v) = env_opt(ENV_SHUTDOWN_POLICY) {
            self.shutdown_policy = parse_env(ENV_SHUTDOWN_POLICY, v)?;
        }
        if let Some(v) = env_opt(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = v;
        }
        if let Some(v) = env_opt(ENV_LOG_UNOBSERVED) {
            self.log_unobserved_failures = parse_env(ENV_LOG_UNOBSERVED, v)?;
        }
        Ok(self)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            workers = self.resolved_worker_threads(),
            shutdown_policy = %self.shutdown_policy,
            thread_name_prefix = %self.thread_name_prefix,
            log_unobserved_failures = self.log_unobserved_failures,
            "scheduler config loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(config.thread_name_prefix, "taskpool-worker");
        assert!(config.log_unobserved_failures);
    }

    #[test]
    fn resolved_worker_threads() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 8;
        assert_eq!(config.resolved_worker_threads(), 8);
    }

    #[test]
    fn parses_partial_toml() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            worker_threads = 3
            shutdown_policy = "abandon"
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Abandon);
        assert_eq!(config.thread_name_prefix, "taskpool-worker");
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SchedulerConfig::from_toml_str("").unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = SchedulerConfig::from_toml_str(r#"shutdown_policy = "explode""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn shutdown_policy_from_str() {
        assert_eq!("Drain".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Drain));
        assert_eq!(" abandon ".parse::<ShutdownPolicy>(), Ok(ShutdownPolicy::Abandon));
        assert!("later".parse::<ShutdownPolicy>().is_err());
        assert_eq!(ShutdownPolicy::Abandon.to_string(), "abandon");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SchedulerConfig::from_file("/nonexistent/taskpool.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn parse_env_reports_key() {
        let err = parse_env::<usize>(ENV_WORKER_THREADS, "many".into()).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for TASKPOOL_WORKER_THREADS: \"many\"");
    }

    // The only test in this binary that touches `TASKPOOL_*` keys.
    #[test]
    fn env_overrides_apply_and_reject_bad_values() {
        let keys = [ENV_WORKER_THREADS, ENV_SHUTDOWN_POLICY, ENV_THREAD_NAME_PREFIX, ENV_LOG_UNOBSERVED];

        env::set_var(ENV_WORKER_THREADS, " 6 ");
        env::set_var(ENV_SHUTDOWN_POLICY, "abandon");
        env::set_var(ENV_THREAD_NAME_PREFIX, "env-pool");
        env::set_var(ENV_LOG_UNOBSERVED, "false");

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Abandon);
        assert_eq!(config.thread_name_prefix, "env-pool");
        assert!(!config.log_unobserved_failures);

        // Env wins over file values; empty values are ignored.
        env::set_var(ENV_THREAD_NAME_PREFIX, "");
        let base = SchedulerConfig::from_toml_str(
            r#"
            worker_threads = 2
            thread_name_prefix = "from-file"
            "#,
        )
        .unwrap();
        let config = base.with_env_overrides().unwrap();
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.thread_name_prefix, "from-file");

        env::set_var(ENV_WORKER_THREADS, "lots");
        match SchedulerConfig::from_env().unwrap_err() {
            ConfigError::InvalidEnv { key, value } => {
                assert_eq!(key, ENV_WORKER_THREADS);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
        env::remove_var(ENV_WORKER_THREADS);

        env::set_var(ENV_SHUTDOWN_POLICY, "explode");
        let err = SchedulerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == ENV_SHUTDOWN_POLICY));

        for key in keys {
            env::remove_var(key);
        }
        assert_eq!(SchedulerConfig::from_env().unwrap(), SchedulerConfig::default());
    }
}
