use thiserror::Error;

/// Failure of a single store call.
///
/// Neither variant says anything about who holds a lock: a call that reached
/// the store and found a foreign owner returns `Ok(false)` instead.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Endpoint resolution, connection, transport or timeout failure.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error reply.
    #[error("coordination store rejected the operation: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
