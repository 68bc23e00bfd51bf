//! # CMS Events
//!
//! Domain event envelopes and the bus they are published on.
//!
//! ## Overview
//!
//! - **Envelope**: `DomainEventEnvelope { id, name, version, occurredAt, payload, meta }`
//! - **Event Bus**: Publish/subscribe with dotted topic wildcards
//! - **Event Handlers**: Async event processing
//!
//! Envelopes are only published after the transaction that produced them has
//! committed; a rolled-back command emits nothing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_events::{DomainEventEnvelope, EventBus, EventMeta, MemoryEventBus};
//! use cms_tenant::DomainId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MemoryEventBus::new();
//! let mut sub = bus.subscribe("content.*").await?;
//!
//! bus.publish(DomainEventEnvelope::new(
//!     "content.published",
//!     serde_json::json!({ "contentId": "page-0001" }),
//!     EventMeta {
//!         correlation_id: "req-1".into(),
//!         domain_id: DomainId::new("blog.acme.test"),
//!         source: "cms-core".into(),
//!     },
//! ))
//! .await?;
//!
//! let event = sub.recv().await?;
//! assert_eq!(event.name, "content.published");
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod envelope;

pub use bus::{
    topic_matches, EventBus, EventBusError, EventBusResult, EventBusStats, EventHandler,
    MemoryEventBus, Subscription,
};
pub use envelope::{DomainEventEnvelope, EventMeta, ENVELOPE_VERSION};
