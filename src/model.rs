use serde::{Deserialize, Serialize};

/// A member role on a repository, ordered by precedence.
///
/// When a user appears in more than one role list of the same source, the
/// highest-precedence role wins and the user is dropped from the lower lists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Developer,
    Viewer,
    Reporter,
}

impl Role {
    /// All roles in precedence order, highest first. Desired-role computation
    /// and diffing iterate this order; it is the single source of truth for
    /// precedence.
    pub const ORDERED: [Role; 4] = [Role::Manager, Role::Developer, Role::Viewer, Role::Reporter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Developer => "developer",
            Role::Viewer => "viewer",
            Role::Reporter => "reporter",
        }
    }

    pub fn parse_role(s: &str) -> Option<Role> {
        match s {
            "manager" => Some(Role::Manager),
            "developer" => Some(Role::Developer),
            "viewer" => Some(Role::Viewer),
            "reporter" => Some(Role::Reporter),
            _ => None,
        }
    }
}

/// Repository visibility on the forge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    /// The manifest `type` field; anything other than "private" provisions a
    /// public repository.
    pub fn from_manifest_type(s: &str) -> Visibility {
        if s == "private" {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_precedence_order() {
        assert!(Role::Manager < Role::Developer);
        assert!(Role::Developer < Role::Viewer);
        assert!(Role::Viewer < Role::Reporter);
        assert_eq!(Role::ORDERED[0], Role::Manager);
        assert_eq!(Role::ORDERED[3], Role::Reporter);
    }

    #[test]
    fn role_round_trip() {
        for role in Role::ORDERED {
            assert_eq!(Role::parse_role(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse_role("owner"), None);
    }

    #[test]
    fn visibility_from_manifest_type() {
        assert_eq!(Visibility::from_manifest_type("private"), Visibility::Private);
        assert_eq!(Visibility::from_manifest_type("public"), Visibility::Public);
        assert_eq!(Visibility::from_manifest_type("protected"), Visibility::Public);
    }
}
