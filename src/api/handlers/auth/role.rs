//! Closed role set and membership checks.
//!
//! Authorization is "is the caller's role a member of the allowed set for
//! this route", never a hierarchy walk. Roles are stored as text and
//! parsed at the session boundary so handlers only ever see the enum.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    DevTester,
    Developer,
    Staff,
    Admin,
    Ceo,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::DevTester => "dev_tester",
            Self::Developer => "developer",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::Ceo => "ceo",
        }
    }

    /// Parse a stored role column value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "dev_tester" => Some(Self::DevTester),
            "developer" => Some(Self::Developer),
            "staff" => Some(Self::Staff),
            "admin" => Some(Self::Admin),
            "ceo" => Some(Self::Ceo),
            _ => None,
        }
    }
}

/// Roles allowed to touch the admin surfaces (users, audit, toggle writes).
pub(crate) const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::Ceo];

/// Roles with access to the staff-facing surfaces (board, toggles read).
pub(crate) const STAFF_ROLES: &[Role] = &[
    Role::DevTester,
    Role::Developer,
    Role::Staff,
    Role::Admin,
    Role::Ceo,
];

#[cfg(test)]
mod tests {
    use super::{Role, ADMIN_ROLES, STAFF_ROLES};

    #[test]
    fn role_round_trips_through_text() {
        for role in [
            Role::User,
            Role::DevTester,
            Role::Developer,
            Role::Staff,
            Role::Admin,
            Role::Ceo,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_parse_normalizes_case_and_whitespace() {
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("DEV_TESTER"), Some(Role::DevTester));
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_sets_are_membership_not_hierarchy() {
        assert!(!ADMIN_ROLES.contains(&Role::Staff));
        assert!(ADMIN_ROLES.contains(&Role::Ceo));
        assert!(STAFF_ROLES.contains(&Role::DevTester));
        assert!(!STAFF_ROLES.contains(&Role::User));
    }
}
