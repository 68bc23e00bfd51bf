//! # CMS Gateway
//!
//! The narrow interface transport handlers call into. A [`Gateway`] owns the
//! rate limiter, token verifier and content service and runs every command
//! through them in a fixed order:
//!
//! ```text
//! rate limit -> verify token -> role check -> ownership guard -> command
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cms_auth::RequestMetadata;
//! use cms_core::MemoryStore;
//! use cms_events::MemoryEventBus;
//! use cms_gateway::{telemetry, ContentCommand, Gateway, GatewayConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env();
//! telemetry::init(config.log_format);
//!
//! let gateway = Gateway::from_config(&config, MemoryStore::new(), Arc::new(MemoryEventBus::new()))?;
//! let _sweepers = gateway.spawn_sweepers();
//!
//! let meta = RequestMetadata::new("203.0.113.9".parse()?, "req-1")
//!     .with_authorization("Bearer eyJhbGciOi...");
//! let response = gateway
//!     .handle(&meta, ContentCommand::Archive { content_id: "page-0001".into() })
//!     .await;
//!
//! for (name, value) in response.headers() {
//!     println!("{name}: {value}");
//! }
//! println!("{} {}", response.status, serde_json::to_string(&response.body)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Status mapping
//!
//! | Error | Status |
//! |-------|--------|
//! | `Authentication` | 401 |
//! | `Authorization` (role, domain not owned) | 403 |
//! | `Validation` | 400 |
//! | `NotFound` (including stale ownership on archive) | 404 |
//! | `Conflict` (wrong status, transfer race) | 409 |
//! | `RateLimited` | 429 |
//! | `Infrastructure` | 500 |

pub mod config;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod telemetry;

pub use config::{ConfigError, GatewayConfig};
pub use error::ApiError;
pub use outcome::{CommandOutcome, ErrorBody, RateLimitHeaders};
pub use pipeline::{CommandItem, ContentCommand, Gateway, GatewayResponse};
pub use telemetry::LogFormat;
