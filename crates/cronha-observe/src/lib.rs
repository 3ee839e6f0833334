//! Process-wide `tracing` setup for cron-ha binaries.
mod logger;
pub use logger::*;
