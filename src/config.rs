//! Sync queue configuration
//!
//! Values come from the environment (after `dotenvy` has loaded `.env`);
//! anything missing or unparsable falls back to the defaults below.

use std::env;
use std::str::FromStr;

/// Maximum events per remote call
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Attempts after which an event is abandoned
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Batches in flight at once
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Synced events older than this are swept
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Outbox drain interval in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Retention sweep interval in seconds (24 hours)
pub const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 86400;

pub const ENV_BATCH_SIZE: &str = "SYNC_BATCH_SIZE";
pub const ENV_MAX_ATTEMPTS: &str = "SYNC_MAX_ATTEMPTS";
pub const ENV_CONCURRENCY: &str = "SYNC_CONCURRENCY";
pub const ENV_RETENTION_DAYS: &str = "SYNC_RETENTION_DAYS";
pub const ENV_SYNC_INTERVAL: &str = "SYNC_INTERVAL_SECS";
pub const ENV_RETENTION_INTERVAL: &str = "SYNC_RETENTION_INTERVAL_SECS";
pub const ENV_ORDERED_STAGES: &str = "SYNC_ORDERED_STAGES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub max_attempts: i32,
    pub concurrency: usize,
    pub retention_days: i64,
    pub sync_interval_secs: u64,
    pub retention_interval_secs: u64,
    /// Drain parent entity types before the ones that reference them
    pub ordered_stages: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            concurrency: DEFAULT_CONCURRENCY,
            retention_days: DEFAULT_RETENTION_DAYS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            retention_interval_secs: DEFAULT_RETENTION_INTERVAL_SECS,
            ordered_stages: true,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: positive_or(env_parse(ENV_BATCH_SIZE), defaults.batch_size),
            max_attempts: env_parse(ENV_MAX_ATTEMPTS)
                .filter(|v: &i32| *v > 0)
                .unwrap_or(defaults.max_attempts),
            concurrency: positive_or(env_parse(ENV_CONCURRENCY), defaults.concurrency),
            retention_days: env_parse(ENV_RETENTION_DAYS)
                .filter(|v: &i64| *v > 0)
                .unwrap_or(defaults.retention_days),
            sync_interval_secs: positive_or(env_parse(ENV_SYNC_INTERVAL), defaults.sync_interval_secs),
            retention_interval_secs: positive_or(
                env_parse(ENV_RETENTION_INTERVAL),
                defaults.retention_interval_secs,
            ),
            ordered_stages: env::var(ENV_ORDERED_STAGES)
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.ordered_stages),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Boolean env value; `None` for anything unrecognised
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn positive_or<T: PartialOrd + Default>(value: Option<T>, default: T) -> T {
    value.filter(|v| *v > T::default()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.retention_days, 7);
        assert!(config.ordered_stages);
    }

    #[test]
    fn test_positive_or_rejects_zero() {
        assert_eq!(positive_or(Some(0usize), 50), 50);
        assert_eq!(positive_or(Some(10usize), 50), 10);
        assert_eq!(positive_or(None, 3usize), 3);
    }

    #[test]
    fn test_parse_flag() {
        for off in ["false", "0", "no", "OFF", " False "] {
            assert_eq!(parse_flag(off), Some(false), "{}", off);
        }
        for on in ["true", "1", "yes", "On"] {
            assert_eq!(parse_flag(on), Some(true), "{}", on);
        }
        assert_eq!(parse_flag("sometimes"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(ENV_BATCH_SIZE, "SYNC_BATCH_SIZE");
        assert_eq!(ENV_MAX_ATTEMPTS, "SYNC_MAX_ATTEMPTS");
        assert_eq!(ENV_ORDERED_STAGES, "SYNC_ORDERED_STAGES");
    }
}
