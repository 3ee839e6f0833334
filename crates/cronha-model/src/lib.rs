mod domain;
pub use domain::{Endpoint, Role, RunToken, ServerIdentity};

mod config;
pub use config::CoordinationConfig;
pub use config::{
    DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_GROUP_NAME, DEFAULT_JOB_LOCK_PREFIX,
    DEFAULT_LOCK_TIMEOUT_SECONDS, DEFAULT_PRIMARY_LOCK_KEY, DEFAULT_STORE_TIMEOUT_MS,
};

mod error;
pub use error::{ModelError, ModelResult};
