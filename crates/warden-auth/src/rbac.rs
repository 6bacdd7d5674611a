//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use warden_common::Principal;

/// Built-in permission names.
pub mod permissions {
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const DELETE: &str = "delete";
    pub const MANAGE_USERS: &str = "manage_users";
}

/// Role name to permission set mapping shared by every clone.
///
/// A principal's effective permissions are the union over its roles; roles missing from the
/// table contribute nothing.
#[derive(Debug, Clone)]
pub struct RolePermissionTable {
    roles: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        use permissions::*;

        let table = Self::empty();
        for permission in [READ, WRITE, DELETE, MANAGE_USERS] {
            table.add_role_permission("admin", permission);
        }
        for permission in [READ, WRITE] {
            table.add_role_permission("editor", permission);
        }
        table.add_role_permission("viewer", READ);
        table
    }
}

impl RolePermissionTable {
    /// Table pre-populated with `admin`, `editor` and `viewer`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table without any roles.
    pub fn empty() -> Self {
        Self {
            roles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn check_permission(&self, principal: &Principal, permission: &str) -> bool {
        let roles = self.roles.read();
        principal.roles.iter().any(|role| {
            roles
                .get(role)
                .is_some_and(|granted| granted.contains(permission))
        })
    }

    pub fn user_permissions(&self, principal: &Principal) -> BTreeSet<String> {
        let roles = self.roles.read();
        principal
            .roles
            .iter()
            .filter_map(|role| roles.get(role))
            .flatten()
            .cloned()
            .collect()
    }

    /// Grant `permission` to `role`, creating the role if needed. Returns false when the
    /// permission was already present.
    pub fn add_role_permission(&self, role: &str, permission: &str) -> bool {
        let added = self
            .roles
            .write()
            .entry(role.to_owned())
            .or_default()
            .insert(permission.to_owned());
        if added {
            info!(role, permission, "role permission granted");
        }
        added
    }

    /// Revoke `permission` from `role`. Returns false when there was nothing to remove.
    pub fn remove_role_permission(&self, role: &str, permission: &str) -> bool {
        let removed = self
            .roles
            .write()
            .get_mut(role)
            .is_some_and(|granted| granted.remove(permission));
        if removed {
            info!(role, permission, "role permission revoked");
        }
        removed
    }

    /// Known role names, sorted.
    pub fn list_roles(&self) -> Vec<String> {
        let mut names: Vec<_> = self.roles.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn role_permissions(&self, role: &str) -> Option<BTreeSet<String>> {
        self.roles.read().get(role).cloned()
    }
}
