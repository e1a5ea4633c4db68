//! System roles and their privilege ordering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse privilege level of a signed-in user.
///
/// Distinct from the free-text job roles carried by team members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Worker,
    #[default]
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Worker, Role::User];

    /// Position in the privilege hierarchy; higher outranks lower.
    pub fn rank(self) -> u8 {
        match self {
            Role::Admin => 3,
            Role::Manager => 2,
            Role::Worker => 1,
            Role::User => 0,
        }
    }

    /// True when `self` is at least as privileged as `required`.
    pub fn has_role(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Worker => "worker",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "worker" => Ok(Role::Worker),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_role_is_reflexive() {
        for role in Role::ALL {
            assert!(role.has_role(role), "{role} should satisfy itself");
        }
    }

    #[test]
    fn admin_outranks_everyone() {
        for role in Role::ALL {
            assert!(Role::Admin.has_role(role));
        }
    }

    #[test]
    fn hierarchy_order() {
        assert!(Role::Manager.has_role(Role::Worker));
        assert!(Role::Worker.has_role(Role::User));
        assert!(!Role::Worker.has_role(Role::Manager));
        assert!(!Role::User.has_role(Role::Worker));
        assert!(!Role::Manager.has_role(Role::Admin));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" worker ".parse::<Role>(), Ok(Role::Worker));
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn defaults_to_least_privilege() {
        assert_eq!(Role::default(), Role::User);
    }
}
