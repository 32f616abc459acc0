use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Permission groups a user may hold, stored one row per grant in
/// `user_roles`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Employee,
    Admin,
    Supplier,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Client, Role::Employee, Role::Admin, Role::Supplier];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Employee => "employee",
            Role::Admin => "admin",
            Role::Supplier => "supplier",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "employee" => Ok(Role::Employee),
            "admin" => Ok(Role::Admin),
            "supplier" => Ok(Role::Supplier),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Roles that may open the order history views.
pub const ORDER_ROLES: &[Role] = &[Role::Client, Role::Admin];
pub const ADMIN_ROLES: &[Role] = &[Role::Admin];
/// Roles admitted to the team chat.
pub const CHAT_ROLES: &[Role] = &[Role::Admin, Role::Employee, Role::Supplier];
pub const REVIEW_ROLES: &[Role] = &[Role::Client];

/// The role set of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses raw role names as stored in the database. Any unrecognised
    /// name fails the whole set.
    pub fn parse_all<I, S>(names: I) -> Result<Self, UnknownRole>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<Role>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// True when at least one of `required` is held.
    #[must_use]
    pub fn has_any(&self, required: &[Role]) -> bool {
        required.iter().any(|role| self.0.contains(role))
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Role> {
        self.iter().collect()
    }

    /// Roles to grant and to revoke to turn `self` into `target`.
    #[must_use]
    pub fn diff(&self, target: &RoleSet) -> (Vec<Role>, Vec<Role>) {
        let to_add = target.0.difference(&self.0).copied().collect();
        let to_remove = self.0.difference(&target.0).copied().collect();
        (to_add, to_remove)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles_and_rejects_others() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!(
            "fournisseur".parse::<Role>(),
            Err(UnknownRole("fournisseur".into()))
        );
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn parse_all_fails_on_unknown_name() {
        let ok = RoleSet::parse_all(["client", "admin", "client"]).expect("valid roles");
        assert!(ok.has_role(Role::Client));
        assert!(ok.has_role(Role::Admin));
        assert_eq!(ok.iter().count(), 2);

        let err = RoleSet::parse_all(["client", "superuser"]).unwrap_err();
        assert_eq!(err.0, "superuser");
    }

    #[test]
    fn has_any_uses_union_semantics() {
        let roles: RoleSet = [Role::Client].into_iter().collect();
        assert!(roles.has_any(&[Role::Client, Role::Admin]));
        assert!(!roles.has_any(ADMIN_ROLES));
        assert!(!RoleSet::new().has_any(ORDER_ROLES));
        assert!(!roles.has_any(&[]));
    }

    #[test]
    fn diff_splits_grants_and_revocations() {
        let current: RoleSet = [Role::Client, Role::Employee].into_iter().collect();
        let target: RoleSet = [Role::Employee, Role::Admin].into_iter().collect();

        let (add, remove) = current.diff(&target);
        assert_eq!(add, vec![Role::Admin]);
        assert_eq!(remove, vec![Role::Client]);
    }

    #[test]
    fn serializes_as_snake_case_list() {
        let roles: RoleSet = [Role::Supplier, Role::Client].into_iter().collect();
        let json = serde_json::to_string(&roles).expect("serialize");
        assert_eq!(json, r#"["client","supplier"]"#);
    }
}
