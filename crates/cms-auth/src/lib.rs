//! # CMS Authentication
//!
//! Bearer token verification for the CMS control plane. Tokens are issued by
//! an external identity provider; this crate only verifies them.
//!
//! ## Overview
//!
//! The cms-auth crate handles:
//! - **Verification**: HMAC JWTs with primary/secondary keys for zero-downtime rotation
//! - **Claims**: Subject, organization, role, optional organization binding
//! - **Timing safety**: Constant-time prefix and organization-binding comparisons
//! - **Audit**: Every outcome recorded with a classification, never token bytes
//! - **Memoisation**: Optional verified-token cache keyed by token digest
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_auth::{RequestMetadata, TokenVerifier, VerifierConfig};
//!
//! let verifier = TokenVerifier::new(
//!     VerifierConfig::new(
//!         "a-32-byte-or-longer-signing-secret!!",
//!         "https://id.example.test",
//!         "cms-api",
//!     )
//!     .with_secondary_secret("the-previous-32-byte-signing-secret!"),
//! )
//! .unwrap();
//!
//! let meta = RequestMetadata::new("203.0.113.9".parse().unwrap(), "req-1")
//!     .with_authorization("Bearer eyJhbGciOi...");
//!
//! match verifier.verify(&meta) {
//!     Ok(ctx) => println!("user {} acting for {}", ctx.user_id, ctx.org_id),
//!     Err(e) => println!("rejected: {} ({})", e, e.error_code()),
//! }
//! ```
//!
//! ## Failure kinds
//!
//! `MissingToken`, `InvalidFormat`, `VerificationFailed`, `MissingClaim`,
//! `OrgBindingMismatch`. All map to 401; `VerificationFailed` renders the same
//! message whatever the underlying cause so callers learn nothing about which
//! check failed.

pub mod audit;
pub mod claims;
pub mod constant_time;
pub mod context;
pub mod error;
pub mod verifier;

// Re-export main types
pub use audit::{AuditOutcome, AuditSink, AuthAuditEvent, MemoryAuditSink, TracingAuditSink};
pub use claims::{Audience, TokenClaims};
pub use context::{AuthContext, RequestMetadata};
pub use error::{AuthError, AuthResult, VerificationFailure};
pub use verifier::{JwtAlgorithm, TokenVerifier, VerifierConfig, MIN_SECRET_LEN};
