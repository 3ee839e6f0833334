use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::{LogTimeZone, LoggerFormat, LoggerLevel};

/// `log:` section of the cron-ha configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: LoggerLevel,
    #[serde(alias = "tz")]
    pub timezone: LogTimeZone,
    /// Include the emitting module in each record.
    pub with_targets: bool,
    /// ANSI colors for text output; ignored when stderr is not a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: LoggerLevel::default(),
            timezone: LogTimeZone::Utc,
            with_targets: false,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    /// Apply command-line and environment overrides.
    ///
    /// `debug` forces the `debug` level; otherwise a valid `CRON_HA_LOG` wins
    /// over the file.
    pub fn with_overrides(mut self, debug: bool) -> Self {
        if debug {
            self.level = LoggerLevel::new("debug").unwrap_or_default();
        } else if let Some(level) = LoggerLevel::from_env() {
            self.level = level;
        }
        self
    }

    pub(crate) fn ansi(&self) -> bool {
        self.use_color && std::io::stderr().is_terminal()
    }
}
