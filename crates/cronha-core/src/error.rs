use thiserror::Error;

use cronha_store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("lock '{key}' is not held by this run")]
    LockNotHeld { key: String },
}
