//! Run configuration, read from `MAILBRIEF_*` environment variables.
//!
//! Component settings (IMAP, summary API, Notion) live next to the
//! component and are read by their own `from_env()` constructors.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::source::{FetchCriteria, FetchOrder};
use crate::summarize::DEFAULT_SUMMARY_MAX_LEN;

/// Read a variable, treating blank values as unset.
pub fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional raw value, naming `key` in the error.
pub fn parse_value<T>(key: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.map(|v| {
        v.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("`{v}`: {e}"),
        })
    })
    .transpose()
}

fn parse_flag(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("`{other}` is not a boolean"),
        }),
    }
}

/// Top-level run settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub limit: usize,
    pub query: Option<String>,
    pub order: FetchOrder,
    /// Render sink payloads and skip persistence.
    pub dry_run: bool,
    /// Run repeatedly at this interval; `None` runs once.
    pub interval: Option<Duration>,
    pub summary_max_len: usize,
    /// Read `.eml` files from here instead of IMAP.
    pub eml_dir: Option<PathBuf>,
    /// Also write a daily-rolling log file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/mailbrief.db"),
            limit: 10,
            query: None,
            order: FetchOrder::Recent,
            dry_run: false,
            interval: None,
            summary_max_len: DEFAULT_SUMMARY_MAX_LEN,
            eml_dir: None,
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_value)
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let interval = parse_value::<u64>("MAILBRIEF_INTERVAL_SECS", lookup("MAILBRIEF_INTERVAL_SECS"))?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let summary_max_len =
            parse_value::<usize>("MAILBRIEF_SUMMARY_MAX_LEN", lookup("MAILBRIEF_SUMMARY_MAX_LEN"))?
                .unwrap_or(defaults.summary_max_len);
        if summary_max_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAILBRIEF_SUMMARY_MAX_LEN".into(),
                message: "must be positive".into(),
            });
        }

        Ok(Self {
            db_path: lookup("MAILBRIEF_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            limit: parse_value("MAILBRIEF_LIMIT", lookup("MAILBRIEF_LIMIT"))?
                .unwrap_or(defaults.limit),
            query: lookup("MAILBRIEF_QUERY"),
            order: parse_value("MAILBRIEF_ORDER", lookup("MAILBRIEF_ORDER"))?
                .unwrap_or(defaults.order),
            dry_run: parse_flag("MAILBRIEF_DRY_RUN", lookup("MAILBRIEF_DRY_RUN"))?,
            interval,
            summary_max_len,
            eml_dir: lookup("MAILBRIEF_EML_DIR").map(PathBuf::from),
            log_dir: lookup("MAILBRIEF_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn criteria(&self) -> FetchCriteria {
        FetchCriteria {
            limit: self.limit,
            query: self.query.clone(),
            order: self.order,
        }
    }
}
