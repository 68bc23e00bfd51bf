//! # Permissions
//!
//! A permission combines a resource type with an action.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::actions::Action;
use crate::resources::ResourceType;

/// A permission is a combination of resource type and action.
///
/// # Example
///
/// ```
/// use cms_rbac::{Action, Permission, ResourceType};
///
/// let perm = Permission::new(ResourceType::Content, Action::Publish);
/// assert_eq!(perm.to_string(), "content:publish");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission {
    /// The resource type this permission applies to.
    pub resource: ResourceType,
    /// The action allowed on the resource.
    pub action: Action,
}

impl Permission {
    pub fn new(resource: ResourceType, action: Action) -> Self {
        Self { resource, action }
    }

    /// Check if this permission grants `action` on `resource`.
    ///
    /// The resource types must match, and the actions must be equal or this
    /// action must imply the other.
    pub fn grants(&self, resource: ResourceType, action: Action) -> bool {
        self.resource == resource && (self.action == action || self.action.implies(action))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// A set of permissions assigned to a role.
///
/// # Example
///
/// ```
/// use cms_rbac::{Action, Permission, PermissionSet, ResourceType};
///
/// let mut set = PermissionSet::new();
/// set.add_all([Permission::new(ResourceType::Content, Action::Manage)]);
///
/// assert!(set.allows(ResourceType::Content, Action::Archive));
/// assert!(!set.allows(ResourceType::Domain, Action::Transfer));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub(crate) permissions: HashSet<Permission>,
}

impl PermissionSet {
    /// Create a new empty permission set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add multiple permissions to the set.
    pub fn add_all<I>(&mut self, permissions: I)
    where
        I: IntoIterator<Item = Permission>,
    {
        self.permissions.extend(permissions);
    }

    /// Check whether any permission in the set grants `action` on `resource`,
    /// directly or by implication.
    pub fn allows(&self, resource: ResourceType, action: Action) -> bool {
        self.permissions
            .iter()
            .any(|granted| granted.grants(resource, action))
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}
