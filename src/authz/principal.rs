use std::collections::BTreeSet;

use uuid::Uuid;

use super::resolver::PermissionResolver;
use super::{Permission, Role};

/// Principal represents the authenticated user and the role read for this request
///
/// The role is `None` when the stored value is missing or unrecognized; every
/// capability query then answers `false`.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Option<Role>,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Option<Role>) -> Self {
        Self { user_id, role }
    }

    pub fn can(&self, permission: Permission) -> bool {
        PermissionResolver::global().has_permission(self.role, permission)
    }

    pub fn can_any(&self, permissions: &[Permission]) -> bool {
        PermissionResolver::global().has_any_permission(self.role, permissions)
    }

    pub fn can_all(&self, permissions: &[Permission]) -> bool {
        PermissionResolver::global().has_all_permissions(self.role, permissions)
    }

    pub fn is_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn is_any_role(&self, roles: &[Role]) -> bool {
        self.role.map(|r| roles.contains(&r)).unwrap_or(false)
    }

    pub fn permissions(&self) -> BTreeSet<Permission> {
        PermissionResolver::global().permissions_for(self.role)
    }
}
