//! Environment-variable-backed loader for [`EngineConfig`].
//!
//! # Design
//! - Follows the source architecture's `std::env::var(...).map_err(...)` idiom
//!   rather than introducing a configuration-file dependency: there is no
//!   multi-tenant settings surface here, just three scalars.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

const DATA_DIR_VAR: &str = "SESSION_DATA_DIR";
const MAX_SESSIONS_VAR: &str = "SESSION_MAX_SESSIONS";
const IDLE_TIMEOUT_VAR: &str = "SESSION_IDLE_TIMEOUT_SECS";

/// Default directory used when `SESSION_DATA_DIR` is not set.
const DEFAULT_DATA_DIR: &str = "./data";
/// Default concurrent session cap; `0` means unlimited.
const DEFAULT_MAX_SESSIONS: usize = 0;
/// Default idle-reap threshold in seconds; `0` disables the reaper.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// The engine's narrow configuration surface, loaded from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for session-related storage.
    pub data_dir: PathBuf,
    /// Maximum concurrent sessions; `0` means unlimited.
    pub max_sessions: usize,
    /// Idle-reap threshold; `0` disables the idle reaper.
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
}

impl EngineConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults for any variable that is unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable cannot be parsed into its expected
    /// type.
    pub fn from_env() -> ConfigResult<Self> {
        let data_dir = match std::env::var(DATA_DIR_VAR) {
            Ok(value) => PathBuf::from(value),
            Err(std::env::VarError::NotPresent) => PathBuf::from(DEFAULT_DATA_DIR),
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(ConfigError::InvalidField {
                    field: "data_dir",
                    value: String::from("<non-unicode>"),
                    reason: "must be valid UTF-8",
                });
            }
        };

        let max_sessions = match std::env::var(MAX_SESSIONS_VAR) {
            Ok(value) => value
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidField {
                    field: "max_sessions",
                    value: value.clone(),
                    reason: "must be a non-negative integer",
                })?,
            Err(std::env::VarError::NotPresent) => DEFAULT_MAX_SESSIONS,
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(ConfigError::InvalidField {
                    field: "max_sessions",
                    value: String::from("<non-unicode>"),
                    reason: "must be valid UTF-8",
                });
            }
        };

        let idle_timeout_secs = match std::env::var(IDLE_TIMEOUT_VAR) {
            Ok(value) => value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidField {
                    field: "idle_timeout",
                    value: value.clone(),
                    reason: "must be a non-negative integer number of seconds",
                })?,
            Err(std::env::VarError::NotPresent) => DEFAULT_IDLE_TIMEOUT_SECS,
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(ConfigError::InvalidField {
                    field: "idle_timeout",
                    value: String::from("<non-unicode>"),
                    reason: "must be valid UTF-8",
                });
            }
        };

        Ok(Self {
            data_dir,
            max_sessions,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn with_clean_env<F: FnOnce()>(f: F) {
        let _guard = ENV_GUARD.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for var in [DATA_DIR_VAR, MAX_SESSIONS_VAR, IDLE_TIMEOUT_VAR] {
            unsafe {
                std::env::remove_var(var);
            }
        }
        f();
    }

    #[test]
    fn defaults_apply_when_unset() {
        with_clean_env(|| {
            let config = EngineConfig::from_env().unwrap();
            assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
            assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
            assert_eq!(
                config.idle_timeout,
                Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)
            );
        });
    }

    #[test]
    fn reads_overrides_from_environment() {
        with_clean_env(|| {
            unsafe {
                std::env::set_var(DATA_DIR_VAR, "/tmp/sessions");
                std::env::set_var(MAX_SESSIONS_VAR, "8");
                std::env::set_var(IDLE_TIMEOUT_VAR, "60");
            }
            let config = EngineConfig::from_env().unwrap();
            assert_eq!(config.data_dir, PathBuf::from("/tmp/sessions"));
            assert_eq!(config.max_sessions, 8);
            assert_eq!(config.idle_timeout, Duration::from_secs(60));
            for var in [DATA_DIR_VAR, MAX_SESSIONS_VAR, IDLE_TIMEOUT_VAR] {
                unsafe {
                    std::env::remove_var(var);
                }
            }
        });
    }

    #[test]
    fn rejects_non_numeric_max_sessions() {
        with_clean_env(|| {
            unsafe {
                std::env::set_var(MAX_SESSIONS_VAR, "not-a-number");
            }
            let err = EngineConfig::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidField {
                    field: "max_sessions",
                    ..
                }
            ));
            unsafe {
                std::env::remove_var(MAX_SESSIONS_VAR);
            }
        });
    }
}
