mod clock;
mod config;
mod error;
mod format;
mod install;
mod level;

pub use clock::{LogTimeZone, init_local_offset};
pub use config::LoggerConfig;
pub use error::{LoggerError, LoggerResult};
pub use format::LoggerFormat;
pub use level::{LOG_ENV, LoggerLevel};

/// Install the global subscriber described by `cfg`.
///
/// Text and JSON output go to stderr so a supervised job keeps stdout to
/// itself. For [`LogTimeZone::Local`] call [`init_local_offset`] before the
/// runtime starts any threads.
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => install::text(cfg),
        LoggerFormat::Json => install::json(cfg),
        LoggerFormat::Journald => install::journald(cfg),
    }
}
