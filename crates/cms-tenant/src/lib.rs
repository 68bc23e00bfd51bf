//! # CMS Tenancy Model
//!
//! This crate holds the tenancy vocabulary shared by every other cms crate.
//!
//! ## Overview
//!
//! The cms-tenant crate handles:
//! - **Identifiers**: `OrgId` and `DomainId` newtypes
//! - **Roles**: Hierarchical tenant roles carried on bearer tokens
//! - **Ownership**: The `(domain, organization)` ownership fact and the
//!   immutable record left behind by every transfer
//!
//! ## Architecture
//!
//! ```text
//! Organization (OrgId)
//!   └─ owns ─→ Domain (DomainId)        exactly one owner at any instant
//!                 └─ ContentItem         (see cms-core)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cms_tenant::{DomainId, DomainOwnership, OrgId, TenantRole};
//!
//! let fact = DomainOwnership::new(DomainId::new("blog.acme.test"), OrgId::new("org-acme"));
//! assert!(fact.is_owned_by(&OrgId::new("org-acme")));
//! assert!(TenantRole::Editor.can_edit());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Serialization support (enabled by default)

pub mod ids;
pub mod ownership;
pub mod roles;

// Re-export main types for convenience
pub use ids::{DomainId, OrgId};
pub use ownership::{DomainOwnership, OwnershipTransfer};
pub use roles::TenantRole;
