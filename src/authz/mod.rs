//! Authorization module - role catalogue and permission resolver
//!
//! This module implements the static RBAC model used by the RMA workflow:
//! - Three coarse roles (USER, ADMIN, SUPERADMIN)
//! - Fine-grained `domain:action` permissions grouped by domain
//! - A read-only role -> permission table computed once
//!
//! Every query fails closed: an absent or unrecognized role has no permissions.

mod principal;
mod resolver;

pub use principal::Principal;
pub use resolver::{
    has_all_permissions, has_any_permission, has_permission, permissions_for, PermissionResolver,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse actor classification driving permission sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Admin, Role::Superadmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Superadmin => "SUPERADMIN",
        }
    }

    /// Lenient parse used for stored values; unknown text yields `None`
    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
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
        match s.trim() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "SUPERADMIN" => Ok(Role::Superadmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Permission domains, matching the prefix of every permission token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionDomain {
    Rma,
    User,
    Product,
    Brand,
    Country,
}

/// A named capability in `domain:action` form, e.g. `rma:change_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission(&'static str);

impl Permission {
    const fn new(token: &'static str) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn domain(&self) -> PermissionDomain {
        match self.0.split_once(':').map(|(domain, _)| domain) {
            Some("rma") => PermissionDomain::Rma,
            Some("user") => PermissionDomain::User,
            Some("product") => PermissionDomain::Product,
            Some("brand") => PermissionDomain::Brand,
            _ => PermissionDomain::Country,
        }
    }

    pub fn action(&self) -> &'static str {
        self.0.split_once(':').map(|(_, action)| action).unwrap_or(self.0)
    }

    /// Look up a token in the catalogue
    pub fn lookup(token: &str) -> Option<Self> {
        permissions::ALL.iter().copied().find(|p| p.0 == token)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// Well-known permission names, grouped by domain
pub mod permissions {
    use super::Permission;

    pub mod rma {
        use super::Permission;

        pub const CREATE: Permission = Permission::new("rma:create");
        pub const READ_OWN: Permission = Permission::new("rma:read_own");
        pub const READ_ALL: Permission = Permission::new("rma:read_all");
        pub const UPDATE_OWN: Permission = Permission::new("rma:update_own");
        pub const UPDATE_ALL: Permission = Permission::new("rma:update_all");
        pub const DELETE: Permission = Permission::new("rma:delete");
        pub const CHANGE_STATUS: Permission = Permission::new("rma:change_status");
        pub const ASSIGN_TRACKING: Permission = Permission::new("rma:assign_tracking");
        pub const ADD_EVALUATION: Permission = Permission::new("rma:add_evaluation");
        pub const MANAGE_QUOTES: Permission = Permission::new("rma:manage_quotes");
    }

    pub mod user {
        use super::Permission;

        pub const CREATE: Permission = Permission::new("user:create");
        pub const READ_OWN: Permission = Permission::new("user:read_own");
        pub const READ_ALL: Permission = Permission::new("user:read_all");
        pub const UPDATE_OWN: Permission = Permission::new("user:update_own");
        pub const UPDATE_ALL: Permission = Permission::new("user:update_all");
        pub const DELETE: Permission = Permission::new("user:delete");
        pub const MANAGE_ROLES: Permission = Permission::new("user:manage_roles");
        pub const ASSIGN_COUNTRIES: Permission = Permission::new("user:assign_countries");
    }

    pub mod product {
        use super::Permission;

        pub const CREATE: Permission = Permission::new("product:create");
        pub const READ: Permission = Permission::new("product:read");
        pub const UPDATE: Permission = Permission::new("product:update");
        pub const DELETE: Permission = Permission::new("product:delete");
        pub const MANAGE_AVAILABILITY: Permission = Permission::new("product:manage_availability");
    }

    pub mod brand {
        use super::Permission;

        pub const CREATE: Permission = Permission::new("brand:create");
        pub const READ: Permission = Permission::new("brand:read");
        pub const UPDATE: Permission = Permission::new("brand:update");
        pub const DELETE: Permission = Permission::new("brand:delete");
        pub const MANAGE_COUNTRIES: Permission = Permission::new("brand:manage_countries");
    }

    pub mod country {
        use super::Permission;

        pub const CREATE: Permission = Permission::new("country:create");
        pub const READ: Permission = Permission::new("country:read");
        pub const UPDATE: Permission = Permission::new("country:update");
        pub const DELETE: Permission = Permission::new("country:delete");
    }

    /// Every defined permission, in catalogue order
    pub const ALL: &[Permission] = &[
        rma::CREATE,
        rma::READ_OWN,
        rma::READ_ALL,
        rma::UPDATE_OWN,
        rma::UPDATE_ALL,
        rma::DELETE,
        rma::CHANGE_STATUS,
        rma::ASSIGN_TRACKING,
        rma::ADD_EVALUATION,
        rma::MANAGE_QUOTES,
        user::CREATE,
        user::READ_OWN,
        user::READ_ALL,
        user::UPDATE_OWN,
        user::UPDATE_ALL,
        user::DELETE,
        user::MANAGE_ROLES,
        user::ASSIGN_COUNTRIES,
        product::CREATE,
        product::READ,
        product::UPDATE,
        product::DELETE,
        product::MANAGE_AVAILABILITY,
        brand::CREATE,
        brand::READ,
        brand::UPDATE,
        brand::DELETE,
        brand::MANAGE_COUNTRIES,
        country::CREATE,
        country::READ,
        country::UPDATE,
        country::DELETE,
    ];

    /// Base grants of the USER role
    pub(crate) const USER_GRANTS: &[Permission] = &[
        rma::CREATE,
        rma::READ_OWN,
        rma::UPDATE_OWN,
        user::READ_OWN,
        user::UPDATE_OWN,
        product::READ,
        brand::READ,
        country::READ,
    ];

    /// Grants ADMIN holds on top of USER
    pub(crate) const ADMIN_EXTRA_GRANTS: &[Permission] = &[
        rma::READ_ALL,
        rma::UPDATE_ALL,
        rma::CHANGE_STATUS,
        rma::ASSIGN_TRACKING,
        rma::ADD_EVALUATION,
        rma::MANAGE_QUOTES,
        user::READ_ALL,
        user::CREATE,
        product::CREATE,
        product::UPDATE,
        brand::CREATE,
        brand::UPDATE,
    ];
}
