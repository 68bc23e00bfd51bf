//! Default permission sets for tenant roles.

use cms_tenant::TenantRole;

use crate::actions::Action;
use crate::permissions::{Permission, PermissionSet};
use crate::resources::ResourceType;

impl PermissionSet {
    /// Build the permission set granted to a tenant role.
    ///
    /// | Role   | Grants |
    /// |--------|--------|
    /// | viewer | `content:read`, `content:list` |
    /// | editor | viewer + `content:create`, `content:schedule`, `content:publish`, `content:archive` |
    /// | admin  | editor (member management lives outside this core) |
    /// | owner  | `content:manage`, `domain:manage` |
    ///
    /// ```
    /// use cms_rbac::{Action, PermissionSet, ResourceType};
    /// use cms_tenant::TenantRole;
    ///
    /// let editor = PermissionSet::for_role(TenantRole::Editor);
    /// assert!(editor.allows(ResourceType::Content, Action::Publish));
    /// assert!(!editor.allows(ResourceType::Domain, Action::Transfer));
    /// ```
    pub fn for_role(role: TenantRole) -> Self {
        let mut set = PermissionSet::new();

        set.add_all([
            Permission::new(ResourceType::Content, Action::Read),
            Permission::new(ResourceType::Content, Action::List),
        ]);

        if role.can_edit() {
            set.add_all([
                Permission::new(ResourceType::Content, Action::Create),
                Permission::new(ResourceType::Content, Action::Schedule),
                Permission::new(ResourceType::Content, Action::Publish),
                Permission::new(ResourceType::Content, Action::Archive),
            ]);
        }

        if role.can_transfer_domains() {
            set.add_all([
                Permission::new(ResourceType::Content, Action::Manage),
                Permission::new(ResourceType::Domain, Action::Manage),
            ]);
        }

        set
    }

    /// Union of the permission sets of every given role.
    pub fn for_roles<'a, I>(roles: I) -> Self
    where
        I: IntoIterator<Item = &'a TenantRole>,
    {
        let mut set = PermissionSet::new();
        for role in roles {
            set.permissions.extend(PermissionSet::for_role(*role).permissions);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_is_read_only() {
        let set = PermissionSet::for_role(TenantRole::Viewer);
        assert!(set.allows(ResourceType::Content, Action::Read));
        assert!(set.allows(ResourceType::Content, Action::List));
        assert!(!set.allows(ResourceType::Content, Action::Create));
        assert!(!set.allows(ResourceType::Content, Action::Archive));
        assert!(!set.allows(ResourceType::Domain, Action::Transfer));
    }

    #[test]
    fn test_editor_runs_lifecycle() {
        let set = PermissionSet::for_role(TenantRole::Editor);
        for action in [Action::Create, Action::Schedule, Action::Publish, Action::Archive] {
            assert!(set.allows(ResourceType::Content, action), "{action}");
        }
        assert!(!set.allows(ResourceType::Domain, Action::Transfer));
    }

    #[test]
    fn test_admin_cannot_transfer() {
        let set = PermissionSet::for_role(TenantRole::Admin);
        assert!(set.allows(ResourceType::Content, Action::Publish));
        assert!(!set.allows(ResourceType::Domain, Action::Transfer));
    }

    #[test]
    fn test_owner_can_transfer_domains() {
        let set = PermissionSet::for_role(TenantRole::Owner);
        assert!(set.allows(ResourceType::Domain, Action::Transfer));
        assert!(set.allows(ResourceType::Content, Action::Archive));
    }

    #[test]
    fn test_for_roles_is_union() {
        let set = PermissionSet::for_roles(&[TenantRole::Viewer, TenantRole::Owner]);
        assert!(set.allows(ResourceType::Content, Action::List));
        assert!(set.allows(ResourceType::Domain, Action::Transfer));
        assert!(PermissionSet::for_roles(&[]).is_empty());
    }
}
