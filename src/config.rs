use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::alerting::AlertingConfig;

/// Application-level constants
pub const APP_NAME: &str = "Glycare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compliance sweep period: hourly.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

pub const DEFAULT_DEDUP_WINDOW_HOURS: i64 = 24;

/// Alerts resolved per transaction by the bulk compliance clear.
pub const CLEAR_BATCH_SIZE: usize = 100;

/// Longest look-back accepted by history listings and compliance reports.
pub const MAX_HISTORY_DAYS: u32 = 3660;

pub use crate::db::BUSY_TIMEOUT;

pub const ENV_DB_PATH: &str = "GLYCARE_DB_PATH";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "GLYCARE_SWEEP_INTERVAL_SECS";
pub const ENV_DEDUP_WINDOW_HOURS: &str = "GLYCARE_DEDUP_WINDOW_HOURS";
pub const ENV_ENFORCE_DEDUP: &str = "GLYCARE_ENFORCE_DEDUP";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Get the application data directory
/// ~/Glycare/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("glycare.db"))
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,glycare_lib=debug"
}

/// Settings resolved at startup from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub sweep_interval: Duration,
    pub alerting: AlertingConfig,
}

impl RuntimeConfig {
    /// Load an optional `.env`, then read `GLYCARE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = match lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let sweep_secs: u64 = parse_var(&lookup, ENV_SWEEP_INTERVAL_SECS)?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        if sweep_secs == 0 {
            return Err(invalid(ENV_SWEEP_INTERVAL_SECS, "0", "must be positive"));
        }

        let mut alerting = AlertingConfig::default();
        if let Some(hours) = parse_var::<i64>(&lookup, ENV_DEDUP_WINDOW_HOURS)? {
            if hours <= 0 {
                return Err(invalid(ENV_DEDUP_WINDOW_HOURS, &hours.to_string(), "must be positive"));
            }
            alerting.dedup_window_hours = hours;
        }
        if let Some(raw) = lookup(ENV_ENFORCE_DEDUP) {
            alerting.enforce_dedup_precheck = parse_bool(&raw)
                .ok_or_else(|| invalid(ENV_ENFORCE_DEDUP, &raw, "expected true or false"))?;
        }

        Ok(Self {
            db_path,
            sweep_interval: Duration::from_secs(sweep_secs),
            alerting,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.into(),
        reason: reason.into(),
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| invalid(key, &raw, &e.to_string()))
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir().unwrap();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Glycare"));
    }

    #[test]
    fn default_db_under_app_data() {
        let db = default_db_path().unwrap();
        assert!(db.starts_with(app_data_dir().unwrap()));
        assert!(db.ends_with("glycare.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn defaults_when_unset() {
        let config = RuntimeConfig::from_lookup(lookup(&[("GLYCARE_DB_PATH", "/tmp/g.db")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/g.db"));
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.alerting, AlertingConfig::default());
        assert_eq!(config.alerting.dedup_window_hours, 24);
        assert_eq!(config.alerting.clear_batch_size, 100);
    }

    #[test]
    fn overrides_apply() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("GLYCARE_DB_PATH", "/tmp/g.db"),
            ("GLYCARE_SWEEP_INTERVAL_SECS", "120"),
            ("GLYCARE_DEDUP_WINDOW_HOURS", "6"),
            ("GLYCARE_ENFORCE_DEDUP", "false"),
        ]))
        .unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(120));
        assert_eq!(config.alerting.dedup_window_hours, 6);
        assert!(!config.alerting.enforce_dedup_precheck);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for vars in [
            [("GLYCARE_SWEEP_INTERVAL_SECS", "hourly")],
            [("GLYCARE_SWEEP_INTERVAL_SECS", "0")],
            [("GLYCARE_DEDUP_WINDOW_HOURS", "-1")],
            [("GLYCARE_ENFORCE_DEDUP", "maybe")],
        ] {
            let mut all = vec![("GLYCARE_DB_PATH", "/tmp/g.db")];
            all.extend_from_slice(&vars);
            let err = RuntimeConfig::from_lookup(lookup(&all)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{vars:?}");
        }
    }
}
