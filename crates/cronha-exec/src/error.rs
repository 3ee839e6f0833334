use thiserror::Error;

use cronha_core::error::CoreError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid job specification: {0}")]
    InvalidSpec(String),

    #[error("failed to spawn job: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to deliver signal {signal} to process group {pgid}: {source}")]
    Signal {
        signal: i32,
        pgid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for job: {0}")]
    Wait(#[source] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecError {
    /// The coordination store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, ExecError::Core(CoreError::Store(_)))
    }
}
