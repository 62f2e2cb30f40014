//! Worker configuration from environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DATABASE_PATH_ENV: &str = "SEAROUTE_DATABASE_PATH";
pub const STARTUP_RETRIES_ENV: &str = "SEAROUTE_STARTUP_RETRIES";
pub const STARTUP_RETRY_DELAY_ENV: &str = "SEAROUTE_STARTUP_RETRY_DELAY_SECS";

const DEFAULT_DATABASE_PATH: &str = "searoute.db";
const DEFAULT_STARTUP_RETRIES: u32 = 60;
const DEFAULT_STARTUP_RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub database_path: PathBuf,
    /// Readiness probes before giving up at startup. At least one is made.
    pub startup_retries: u32,
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            startup_retries: DEFAULT_STARTUP_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_STARTUP_RETRY_DELAY_SECS),
        }
    }
}

impl WorkerConfig {
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_path: lookup(DATABASE_PATH_ENV)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            startup_retries: lookup(STARTUP_RETRIES_ENV)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(defaults.startup_retries),
            retry_delay: lookup(STARTUP_RETRY_DELAY_ENV)
                .and_then(|value| value.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
        }
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_overrides(
        mut self,
        database_path: Option<PathBuf>,
        startup_retries: Option<u32>,
        retry_delay_secs: Option<u64>,
    ) -> Self {
        if let Some(path) = database_path {
            self.database_path = path;
        }
        if let Some(retries) = startup_retries {
            self.startup_retries = retries;
        }
        if let Some(secs) = retry_delay_secs {
            self.retry_delay = Duration::from_secs(secs);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_readiness_policy() {
        let config = WorkerConfig::from_lookup(|_| None);
        assert_eq!(config.startup_retries, 60);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.database_path, PathBuf::from("searoute.db"));
    }

    #[test]
    fn environment_values_are_parsed() {
        let config = WorkerConfig::from_lookup(|key| match key {
            DATABASE_PATH_ENV => Some("/data/routes.db".to_string()),
            STARTUP_RETRIES_ENV => Some(" 3 ".to_string()),
            STARTUP_RETRY_DELAY_ENV => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.database_path, PathBuf::from("/data/routes.db"));
        assert_eq!(config.startup_retries, 3);
        assert_eq!(config.retry_delay, Duration::ZERO);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = WorkerConfig::from_lookup(|key| match key {
            STARTUP_RETRIES_ENV => Some("many".to_string()),
            STARTUP_RETRY_DELAY_ENV => Some("-1".to_string()),
            _ => None,
        });
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn overrides_take_precedence() {
        let config = WorkerConfig::default().with_overrides(
            Some(PathBuf::from("other.db")),
            Some(1),
            None,
        );
        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.startup_retries, 1);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }
}
