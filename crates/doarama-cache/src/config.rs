//! Cache configuration.
//!
//! Defaults suit a single user running the upload tool from a shell.
//! Override via environment variables or explicit construction.

use std::path::PathBuf;
use std::time::Duration;

/// File name of the index inside the cache directory.
const DATABASE_FILE: &str = "activities.db";

/// Configuration for opening an index and running a caching creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Location of the SQLite index file.
    pub database_path: PathBuf,
    /// How long to wait for another writer to release the database lock.
    pub busy_timeout: Duration,
    /// Upper bound on a single remote creation; `None` waits indefinitely.
    ///
    /// The per-fingerprint lock is held for the duration of the remote call,
    /// so this also bounds how long identical requests queue behind a hung one.
    pub remote_timeout: Option<Duration>,
    /// Size of the SQLite connection pool.
    pub max_connections: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout: Duration::from_millis(5_000),
            remote_timeout: Some(Duration::from_secs(120)),
            max_connections: 4,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DOARAMA_CACHE_DB` (default: `$XDG_CACHE_HOME/doarama/activities.db`,
    ///   falling back to `$HOME/.cache/doarama/activities.db`)
    /// - `DOARAMA_CACHE_BUSY_TIMEOUT_MS` (default: 5000)
    /// - `DOARAMA_CACHE_REMOTE_TIMEOUT_SECS` (default: 120, `0` disables)
    /// - `DOARAMA_CACHE_MAX_CONNECTIONS` (default: 4, must be at least 1)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_path = std::env::var_os("DOARAMA_CACHE_DB")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let busy_timeout = env_parse::<u64>("DOARAMA_CACHE_BUSY_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.busy_timeout);

        let remote_timeout = match env_parse::<u64>("DOARAMA_CACHE_REMOTE_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.remote_timeout,
        };

        let max_connections = match env_parse::<u32>("DOARAMA_CACHE_MAX_CONNECTIONS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "DOARAMA_CACHE_MAX_CONNECTIONS".to_string(),
                    value: "0".to_string(),
                })
            }
            Some(n) => n,
            None => defaults.max_connections,
        };

        Ok(Self {
            database_path,
            busy_timeout,
            remote_timeout,
            max_connections,
        })
    }
}

/// Default index location under the user's cache directory.
pub fn default_database_path() -> PathBuf {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .filter(|v| !v.is_empty())
                .map(|home| PathBuf::from(home).join(".cache"))
        });
    match base {
        Some(dir) => dir.join("doarama").join(DATABASE_FILE),
        None => PathBuf::from(format!("doarama-{DATABASE_FILE}")),
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = CacheConfig::default();
        assert!(cfg.database_path.ends_with(DATABASE_FILE));
        assert_eq!(cfg.busy_timeout, Duration::from_secs(5));
        assert_eq!(cfg.remote_timeout, Some(Duration::from_secs(120)));
        assert_eq!(cfg.max_connections, 4);
    }

    #[test]
    fn env_parse_absent_is_none() {
        let parsed: Option<u64> = env_parse("DOARAMA_CACHE_TEST_UNSET_12345").unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn env_parse_rejects_garbage() {
        std::env::set_var("DOARAMA_CACHE_TEST_BAD_NUMBER", "soon");
        let result = env_parse::<u64>("DOARAMA_CACHE_TEST_BAD_NUMBER");
        std::env::remove_var("DOARAMA_CACHE_TEST_BAD_NUMBER");
        match result {
            Err(ConfigError::Invalid { var, value }) => {
                assert_eq!(var, "DOARAMA_CACHE_TEST_BAD_NUMBER");
                assert_eq!(value, "soon");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn env_parse_trims_whitespace() {
        std::env::set_var("DOARAMA_CACHE_TEST_PADDED", " 42 ");
        let result = env_parse::<u32>("DOARAMA_CACHE_TEST_PADDED");
        std::env::remove_var("DOARAMA_CACHE_TEST_PADDED");
        assert_eq!(result.unwrap(), Some(42));
    }
}
