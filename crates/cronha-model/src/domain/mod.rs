mod endpoint;
pub use endpoint::Endpoint;

mod identity;
pub use identity::{RunToken, ServerIdentity};

mod role;
pub use role::Role;
