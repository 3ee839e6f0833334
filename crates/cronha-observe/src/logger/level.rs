use std::{env, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::LoggerError;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "CRON_HA_LOG";

/// Validated `EnvFilter` directive string, e.g. `info` or `cronha_core=debug,warn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(s: impl Into<String>) -> Result<Self, LoggerError> {
        Self::try_from(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of [`LOG_ENV`] when set and valid.
    pub fn from_env() -> Option<Self> {
        let raw = env::var(LOG_ENV).ok()?;
        match Self::new(raw) {
            Ok(level) => Some(level),
            Err(e) => {
                eprintln!("cron-ha: ignoring {LOG_ENV}: {e}");
                None
            }
        }
    }

    pub(crate) fn to_env_filter(&self) -> EnvFilter {
        // validated on construction; the fallback is unreachable in practice
        EnvFilter::try_new(&self.0).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".into())
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LoggerLevel {
    type Error = LoggerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match EnvFilter::try_new(&s) {
            Ok(_) => Ok(Self(s)),
            Err(e) => Err(LoggerError::InvalidLevel(format!("{s}: {e}"))),
        }
    }
}

impl From<LoggerLevel> for String {
    fn from(l: LoggerLevel) -> Self {
        l.0
    }
}
