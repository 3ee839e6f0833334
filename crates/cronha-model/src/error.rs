use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot determine server identity: {0}")]
    Identity(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
