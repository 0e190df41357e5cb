//! Principals (roles, users, groups) and the per-kind backend operations
//!
//! Every kind-specific detail lives on [`PrincipalKind`]: the display label and
//! the names of the list/fetch operations. Callers pick a kind once at
//! enumeration time and never branch on it again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the backend operations used for one principal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindOperations {
    /// Enumerate all principals of this kind
    pub list: &'static str,
    /// List inline policy names of one principal
    pub list_inline: &'static str,
    /// Fetch one inline policy document
    pub get_inline: &'static str,
    /// List managed policies attached to one principal
    pub list_attached: &'static str,
}

const ROLE_OPERATIONS: KindOperations = KindOperations {
    list: "ListRoles",
    list_inline: "ListRolePolicies",
    get_inline: "GetRolePolicy",
    list_attached: "ListAttachedRolePolicies",
};

const USER_OPERATIONS: KindOperations = KindOperations {
    list: "ListUsers",
    list_inline: "ListUserPolicies",
    get_inline: "GetUserPolicy",
    list_attached: "ListAttachedUserPolicies",
};

const GROUP_OPERATIONS: KindOperations = KindOperations {
    list: "ListGroups",
    list_inline: "ListGroupPolicies",
    get_inline: "GetGroupPolicy",
    list_attached: "ListAttachedGroupPolicies",
};

/// Kind of identity in the access-control system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Role,
    User,
    Group,
}

impl PrincipalKind {
    /// All kinds, in the default processing order
    pub const ALL: [PrincipalKind; 3] = [PrincipalKind::Role, PrincipalKind::User, PrincipalKind::Group];

    /// Capitalized label used in reports ("Role", "User", "Group")
    pub fn label(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "Role",
            PrincipalKind::User => "User",
            PrincipalKind::Group => "Group",
        }
    }

    /// Lowercase name used in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "role",
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        }
    }

    /// Backend operation names for this kind
    pub fn operations(&self) -> &'static KindOperations {
        match self {
            PrincipalKind::Role => &ROLE_OPERATIONS,
            PrincipalKind::User => &USER_OPERATIONS,
            PrincipalKind::Group => &GROUP_OPERATIONS,
        }
    }

    /// Only roles carry a trust (assume-role) policy
    pub fn has_trust_policy(&self) -> bool {
        matches!(self, PrincipalKind::Role)
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "role" | "roles" => Ok(PrincipalKind::Role),
            "user" | "users" => Ok(PrincipalKind::User),
            "group" | "groups" => Ok(PrincipalKind::Group),
            _ => Err(format!(
                "Invalid principal kind '{}'. Valid options: role, user, group",
                s
            )),
        }
    }
}

/// An identity found by enumeration. Identity is `(kind, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub name: String,
}

impl Principal {
    pub fn new(kind: PrincipalKind, name: impl Into<String>) -> Self {
        Principal {
            kind,
            name: name.into(),
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(PrincipalKind::Role, name)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(PrincipalKind::User, name)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(PrincipalKind::Group, name)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.name)
    }
}
