//! Permission registry
//!
//! Permissions are identified by `resource.action` style ids and must be
//! registered before they can be checked.

use crate::{AuthError, AuthResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique permission identifier
    pub id: String,

    /// Human-readable permission name
    pub name: String,

    pub description: Option<String>,
}

impl Permission {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resource part of a `resource.action` id.
    pub fn resource(&self) -> &str {
        self.id.split_once('.').map_or(self.id.as_str(), |(resource, _)| resource)
    }
}

#[derive(Debug, Default)]
pub struct PermissionManager {
    permissions: RwLock<BTreeMap<String, Permission>>,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, permission: Permission, replace: bool) -> AuthResult<()> {
        let mut permissions = self.permissions.write();
        if permissions.contains_key(&permission.id) && !replace {
            return Err(AuthError::DuplicatePermission {
                permission: permission.id,
            });
        }
        tracing::debug!(permission = %permission.id, replace, "registered permission");
        permissions.insert(permission.id.clone(), permission);
        Ok(())
    }

    pub fn get(&self, id: &str) -> AuthResult<Permission> {
        self.permissions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::PermissionNotFound {
                permission: id.to_string(),
            })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.permissions.read().contains_key(id)
    }

    /// All permissions ordered by id.
    pub fn get_permissions(&self) -> Vec<Permission> {
        self.permissions.read().values().cloned().collect()
    }

    /// Succeeds when every required permission is registered and granted.
    pub fn authorize(&self, granted: &HashSet<String>, required: &[&str]) -> AuthResult<()> {
        for id in required {
            if !self.exists(id) {
                return Err(AuthError::PermissionNotFound {
                    permission: id.to_string(),
                });
            }
            if !granted.contains(*id) {
                return Err(AuthError::access_denied(format!("missing permission [{}]", id)));
            }
        }
        Ok(())
    }

    pub fn has_permission(&self, granted: &HashSet<String>, id: &str) -> bool {
        self.authorize(granted, &[id]).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PermissionManager {
        let manager = PermissionManager::new();
        manager
            .register(Permission::new("users.read", "Read users"), false)
            .unwrap();
        manager
            .register(
                Permission::new("users.delete", "Delete users").with_description("irreversible"),
                false,
            )
            .unwrap();
        manager
    }

    #[test]
    fn test_duplicate_registration() {
        let manager = manager();
        let err = manager
            .register(Permission::new("users.read", "again"), false)
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::DuplicatePermission {
                permission: "users.read".into()
            }
        );
        manager
            .register(Permission::new("users.read", "again"), true)
            .unwrap();
        assert_eq!(manager.get("users.read").unwrap().name, "again");
    }

    #[test]
    fn test_permissions_are_ordered() {
        let ids: Vec<String> = manager().get_permissions().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["users.delete", "users.read"]);
        assert_eq!(manager().get("users.read").unwrap().resource(), "users");
    }

    #[test]
    fn test_authorize() {
        let manager = manager();
        let granted: HashSet<String> = ["users.read".to_string()].into_iter().collect();
        assert!(manager.authorize(&granted, &["users.read"]).is_ok());
        assert_eq!(
            manager.authorize(&granted, &["users.delete"]).unwrap_err().status_code(),
            403
        );
        assert!(matches!(
            manager.authorize(&granted, &["posts.read"]),
            Err(AuthError::PermissionNotFound { .. })
        ));
        assert!(!manager.has_permission(&granted, "users.delete"));
    }
}
