//! Domain ownership facts
//!
//! A domain is owned by exactly one organization at any instant. The owning
//! organization only changes through a verified transfer, and every transfer
//! leaves an immutable audit record behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{DomainId, OrgId};

/// The persisted `(domain, organization)` ownership relation.
///
/// # Examples
///
/// ```
/// use cms_tenant::{DomainOwnership, DomainId, OrgId};
///
/// let fact = DomainOwnership::new(DomainId::new("docs.acme.test"), OrgId::new("org-acme"));
/// assert!(fact.is_owned_by(&OrgId::new("org-acme")));
/// assert!(!fact.is_owned_by(&OrgId::new("org-other")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOwnership {
    /// The owned domain
    pub domain_id: DomainId,

    /// The organization currently owning it
    pub org_id: OrgId,

    /// When this organization became the owner
    pub since: DateTime<Utc>,
}

impl DomainOwnership {
    /// Record that `org_id` owns `domain_id` as of now.
    pub fn new(domain_id: DomainId, org_id: OrgId) -> Self {
        Self {
            domain_id,
            org_id,
            since: Utc::now(),
        }
    }

    /// Check whether the given organization is the owner.
    pub fn is_owned_by(&self, org_id: &OrgId) -> bool {
        &self.org_id == org_id
    }

    /// Apply a transfer, returning the new fact.
    ///
    /// This is the only transition the ownership state machine has:
    /// `Owned(from) --transfer(from -> to)--> Owned(to)`. A transfer naming a
    /// different source organization yields `None` and leaves nothing changed.
    pub fn transferred(&self, from: &OrgId, to: &OrgId, at: DateTime<Utc>) -> Option<Self> {
        if !self.is_owned_by(from) {
            return None;
        }
        Some(Self {
            domain_id: self.domain_id.clone(),
            org_id: to.clone(),
            since: at,
        })
    }
}

/// Immutable audit record appended for every committed ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransfer {
    /// Unique record identifier
    pub id: Uuid,

    /// The transferred domain
    pub domain_id: DomainId,

    /// Previous owner
    pub from_org: OrgId,

    /// New owner
    pub to_org: OrgId,

    /// When the transfer committed
    pub transferred_at: DateTime<Utc>,

    /// Correlation id of the request that initiated the transfer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl OwnershipTransfer {
    /// Create a new transfer record stamped with the current time.
    pub fn new(domain_id: DomainId, from_org: OrgId, to_org: OrgId) -> Self {
        Self {
            id: Uuid::now_v7(),
            domain_id,
            from_org,
            to_org,
            transferred_at: Utc::now(),
            correlation_id: None,
        }
    }

    /// Attach the initiating request's correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
