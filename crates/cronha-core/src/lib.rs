pub mod election;
pub mod error;
pub mod flag;
pub mod lock;

pub mod prelude {
    pub use crate::election::{LeaderElector, probe_role};
    pub use crate::error::CoreError;
    pub use crate::flag::FlagFile;
    pub use crate::lock::CommandLockGuard;
}
