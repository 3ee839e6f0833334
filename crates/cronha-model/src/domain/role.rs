use std::fmt;

use serde::{Deserialize, Serialize};

/// What this server believes about the primary lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    NotPrimary,
    Primary,
}

impl Role {
    pub const fn is_primary(&self) -> bool {
        matches!(self, Role::Primary)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::NotPrimary => "not-primary",
            Role::Primary => "primary",
        };
        f.write_str(s)
    }
}
