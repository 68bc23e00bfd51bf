//! # Actions
//!
//! Operations a caller can perform on content and domains.

use serde::{Deserialize, Serialize};

/// Actions that can be performed on resources.
///
/// - **Read**: View a single content item
/// - **List**: Query/search content in a domain
/// - **Create**: Create a new draft
/// - **Schedule**: Schedule a draft for future publication
/// - **Publish**: Publish a draft or scheduled item
/// - **Archive**: Soft-delete an item (terminal)
/// - **Transfer**: Hand a domain to another organization
/// - **Manage**: Full control, implies every other action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read/view a resource.
    Read,

    /// List/query resources.
    List,

    /// Create new resource.
    Create,

    /// Schedule a draft for later publication.
    Schedule,

    /// Make a resource publicly visible.
    Publish,

    /// Archive (soft delete) a resource.
    ///
    /// Archived content is never hard-deleted and cannot transition again.
    Archive,

    /// Transfer ownership to another organization.
    Transfer,

    /// Manage resource settings.
    ///
    /// Grants administrative access to every action on the resource.
    Manage,
}

impl Action {
    /// Get the string representation of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::List => "list",
            Action::Create => "create",
            Action::Schedule => "schedule",
            Action::Publish => "publish",
            Action::Archive => "archive",
            Action::Transfer => "transfer",
            Action::Manage => "manage",
        }
    }

    /// Check if this action implies another action.
    ///
    /// - `Manage` implies all other actions
    /// - Lifecycle writes (`Create`, `Schedule`, `Publish`, `Archive`) imply `Read`
    ///
    /// # Example
    ///
    /// ```
    /// use cms_rbac::actions::Action;
    ///
    /// assert!(Action::Manage.implies(Action::Transfer));
    /// assert!(Action::Publish.implies(Action::Read));
    /// assert!(!Action::Read.implies(Action::Publish));
    /// ```
    pub fn implies(&self, other: Action) -> bool {
        match self {
            Action::Manage => true,
            Action::Create | Action::Schedule | Action::Publish | Action::Archive => {
                other == Action::Read
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
