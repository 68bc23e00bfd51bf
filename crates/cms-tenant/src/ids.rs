//! Tenant identifiers
//!
//! Organizations and domains are identified by opaque strings issued by the
//! identity provider and the domain registry respectively. Wrapping them in
//! newtypes keeps an organization id from ever being passed where a domain id
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an organization (the tenant).
///
/// # Examples
///
/// ```
/// use cms_tenant::OrgId;
///
/// let org = OrgId::new("org-acme");
/// assert_eq!(org.as_str(), "org-acme");
/// assert_eq!(org.to_string(), "org-acme");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    /// Wrap a raw organization identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (never valid for a tenant).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Consume and return the raw identifier.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrgId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OrgId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a domain (a site owned by exactly one organization).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    /// Wrap a raw domain identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Consume and return the raw identifier.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomainId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DomainId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
