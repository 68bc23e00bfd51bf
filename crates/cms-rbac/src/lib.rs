//! # CMS RBAC (Role-Based Access Control)
//!
//! The role check that sits between token verification and the ownership
//! guard in every request pipeline.
//!
//! ## Architecture
//!
//! ```text
//! Permission = Resource + Action
//!
//! Examples:
//!   "content:read"     - Read any content
//!   "domain:manage"    - Full control of domains, including transfer
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cms_rbac::{Action, PermissionSet, ResourceType};
//! use cms_tenant::TenantRole;
//!
//! let perms = PermissionSet::for_role(TenantRole::Viewer);
//! assert!(perms.allows(ResourceType::Content, Action::List));
//! assert!(!perms.allows(ResourceType::Content, Action::Publish));
//! ```
//!
//! ## Action Implications
//!
//! - `Manage` implies all actions
//! - `Create`, `Schedule`, `Publish`, `Archive` imply `Read`
//!
//! A passing role check says nothing about domain ownership; mutating
//! commands still run through the ownership guard afterwards.

pub mod actions;
pub mod permissions;
pub mod resources;
pub mod roles;

// Re-export main types for convenience
pub use actions::Action;
pub use permissions::{Permission, PermissionSet};
pub use resources::ResourceType;
