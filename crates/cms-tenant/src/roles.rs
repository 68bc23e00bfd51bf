//! Tenant role hierarchy
//!
//! Roles arrive as a claim on the bearer token and are scoped to the
//! organization named by that token.

use serde::{Deserialize, Serialize};

/// User role within an organization.
///
/// Roles are hierarchical, with each role inheriting the capabilities of lower roles.
/// The hierarchy is: Viewer < Editor < Admin < Owner
///
/// # Capability Model
///
/// - **Viewer**: Read and list content
/// - **Editor**: Create, schedule, publish, and archive content
/// - **Admin**: Everything an editor can do, plus member management
/// - **Owner**: Full control including transferring domains to another organization
///
/// # Examples
///
/// ```
/// use cms_tenant::TenantRole;
///
/// let role = TenantRole::Editor;
/// assert!(role.can_edit());
/// assert!(!role.can_transfer_domains());
///
/// assert!(TenantRole::Owner.can_transfer_domains());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    /// Read-only access to organization content
    Viewer = 1,

    /// Can author and move content through its lifecycle
    Editor = 2,

    /// Can manage members
    Admin = 3,

    /// Full organization control
    Owner = 4,
}

impl TenantRole {
    /// Check if this role can create and transition content.
    pub fn can_edit(&self) -> bool {
        *self >= TenantRole::Editor
    }

    /// Check if this role has admin privileges.
    pub fn is_admin(&self) -> bool {
        *self >= TenantRole::Admin
    }

    /// Check if this role may hand a domain over to another organization.
    ///
    /// # Returns
    ///
    /// `true` only for Owner role
    pub fn can_transfer_domains(&self) -> bool {
        *self >= TenantRole::Owner
    }

    /// Parse role from string representation.
    ///
    /// # Arguments
    ///
    /// * `s` - String to parse (case-insensitive)
    ///
    /// # Returns
    ///
    /// `Some(TenantRole)` if valid, `None` otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// use cms_tenant::TenantRole;
    ///
    /// assert_eq!(TenantRole::parse("admin"), Some(TenantRole::Admin));
    /// assert_eq!(TenantRole::parse("EDITOR"), Some(TenantRole::Editor));
    /// assert_eq!(TenantRole::parse("superuser"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// Get string representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// All roles, lowest first.
    pub fn all() -> [TenantRole; 4] {
        [Self::Viewer, Self::Editor, Self::Admin, Self::Owner]
    }
}

impl Default for TenantRole {
    fn default() -> Self {
        Self::Viewer
    }
}

impl std::fmt::Display for TenantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(TenantRole::Owner > TenantRole::Admin);
        assert!(TenantRole::Admin > TenantRole::Editor);
        assert!(TenantRole::Editor > TenantRole::Viewer);
    }

    #[test]
    fn test_role_capabilities() {
        assert!(!TenantRole::Viewer.can_edit());
        assert!(TenantRole::Editor.can_edit());
        assert!(!TenantRole::Editor.is_admin());
        assert!(TenantRole::Admin.is_admin());
        assert!(!TenantRole::Admin.can_transfer_domains());
        assert!(TenantRole::Owner.can_transfer_domains());
    }

    #[test]
    fn test_role_parse_round_trips_as_str() {
        for role in TenantRole::all() {
            assert_eq!(TenantRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(TenantRole::parse(" Owner "), Some(TenantRole::Owner));
        assert_eq!(TenantRole::parse("guest"), None);
    }

    #[test]
    fn test_default_is_least_privileged() {
        assert_eq!(TenantRole::default(), TenantRole::Viewer);
    }
}
