use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use super::permissions::{ADMIN_EXTRA_GRANTS, ALL, USER_GRANTS};
use super::{Permission, Role};

/// Static role -> permission table
///
/// Built once from the catalogue:
/// 1. USER gets the base grants
/// 2. ADMIN gets USER plus the admin extras
/// 3. SUPERADMIN gets every defined permission
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    table: HashMap<Role, BTreeSet<Permission>>,
}

impl PermissionResolver {
    fn build() -> Self {
        let user: BTreeSet<Permission> = USER_GRANTS.iter().copied().collect();
        let admin: BTreeSet<Permission> = user.iter().chain(ADMIN_EXTRA_GRANTS).copied().collect();
        let superadmin: BTreeSet<Permission> = ALL.iter().copied().collect();

        let mut table = HashMap::with_capacity(3);
        table.insert(Role::User, user);
        table.insert(Role::Admin, admin);
        table.insert(Role::Superadmin, superadmin);
        Self { table }
    }

    /// The process-wide read-only table
    pub fn global() -> &'static Self {
        static RESOLVER: OnceLock<PermissionResolver> = OnceLock::new();
        RESOLVER.get_or_init(Self::build)
    }

    pub fn has_permission(&self, role: Option<Role>, permission: Permission) -> bool {
        let granted = role
            .and_then(|r| self.table.get(&r))
            .map(|set| set.contains(&permission))
            .unwrap_or(false);

        tracing::debug!(
            role = role.map(|r| r.as_str()).unwrap_or("none"),
            permission = %permission,
            granted,
            "permission check"
        );
        granted
    }

    /// At least one member passes; empty input is false
    pub fn has_any_permission(&self, role: Option<Role>, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(role, *p))
    }

    /// Every member passes; empty input is vacuously true, so callers gating on
    /// this must check the slice length themselves
    pub fn has_all_permissions(&self, role: Option<Role>, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(role, *p))
    }

    pub fn permissions_for(&self, role: Option<Role>) -> BTreeSet<Permission> {
        role.and_then(|r| self.table.get(&r))
            .cloned()
            .unwrap_or_default()
    }
}

pub fn has_permission(role: Option<Role>, permission: Permission) -> bool {
    PermissionResolver::global().has_permission(role, permission)
}

pub fn has_any_permission(role: Option<Role>, permissions: &[Permission]) -> bool {
    PermissionResolver::global().has_any_permission(role, permissions)
}

pub fn has_all_permissions(role: Option<Role>, permissions: &[Permission]) -> bool {
    PermissionResolver::global().has_all_permissions(role, permissions)
}

pub fn permissions_for(role: Option<Role>) -> BTreeSet<Permission> {
    PermissionResolver::global().permissions_for(role)
}
