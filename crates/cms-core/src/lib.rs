//! # CMS Core
//!
//! Tenant-scoped content and the ownership rules that protect it.
//!
//! ## Overview
//!
//! - **Store**: transactional seam over ownership and content rows, with an
//!   in-memory backend and a PostgreSQL backend (`postgres` feature)
//! - **Guard**: runs mutations under a locked ownership row and moves domains
//!   between organizations under serializable isolation
//! - **Content**: immutable items whose transitions return the next value
//!   plus the event describing it
//! - **Retry**: backoff with jitter, applied only to serialization conflicts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cms_core::{Actor, ContentService, MemoryStore, NewContent, OwnershipGuard};
//! use cms_events::MemoryEventBus;
//! use cms_tenant::{DomainId, OrgId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let guard = OwnershipGuard::new(MemoryStore::new());
//! guard
//!     .register_domain(&DomainId::new("blog.acme.test"), &OrgId::new("org-acme"))
//!     .await?;
//!
//! let service = ContentService::new(guard, Arc::new(MemoryEventBus::new()));
//! let actor = Actor::new(OrgId::new("org-acme"), "req-1");
//!
//! let receipt = service
//!     .create_draft(
//!         &actor,
//!         NewContent {
//!             id: "post-0001".into(),
//!             domain_id: DomainId::new("blog.acme.test"),
//!             title: "Hello".into(),
//!             body: "First post".into(),
//!             content_type: "post".into(),
//!         },
//!     )
//!     .await?;
//! assert_eq!(receipt.event.name, "content.created");
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod guard;
pub mod retry;
pub mod store;

pub use content::{
    Actor, ContentError, ContentEvent, ContentItem, ContentQuery, ContentReceipt, ContentResult,
    ContentService, ContentStatus, NewContent, TransferReceipt, DEFAULT_EVENT_SOURCE,
};
pub use guard::{GuardConfig, GuardError, GuardResult, OwnershipGuard};
pub use retry::{with_retry_if, RetryConfig};
pub use store::{IsolationLevel, StoreError, StoreResult, StoreTransaction, TenancyStore};

#[cfg(feature = "memory")]
pub use store::MemoryStore;
#[cfg(feature = "postgres")]
pub use store::PgStore;
