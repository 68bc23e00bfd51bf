//! Events produced by content transitions and ownership transfers.

use chrono::{DateTime, Utc};
use cms_events::{DomainEventEnvelope, EventMeta};
use cms_tenant::{DomainId, OwnershipTransfer};
use serde::Serialize;

use super::model::ContentStatus;

pub const CONTENT_CREATED: &str = "content.created";
pub const CONTENT_SCHEDULED: &str = "content.scheduled";
pub const CONTENT_PUBLISHED: &str = "content.published";
pub const CONTENT_ARCHIVED: &str = "content.archived";
pub const OWNERSHIP_TRANSFERRED: &str = "domain.ownership_transferred";

/// Describes one content transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent {
    #[serde(rename_all = "camelCase")]
    Created {
        content_id: String,
        domain_id: DomainId,
        title: String,
        content_type: String,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Scheduled {
        content_id: String,
        domain_id: DomainId,
        publish_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Published {
        content_id: String,
        domain_id: DomainId,
        was_scheduled: bool,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Archived {
        content_id: String,
        domain_id: DomainId,
        previous_status: ContentStatus,
        at: DateTime<Utc>,
    },
}

impl ContentEvent {
    /// Dotted event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => CONTENT_CREATED,
            Self::Scheduled { .. } => CONTENT_SCHEDULED,
            Self::Published { .. } => CONTENT_PUBLISHED,
            Self::Archived { .. } => CONTENT_ARCHIVED,
        }
    }

    pub fn domain_id(&self) -> &DomainId {
        match self {
            Self::Created { domain_id, .. }
            | Self::Scheduled { domain_id, .. }
            | Self::Published { domain_id, .. }
            | Self::Archived { domain_id, .. } => domain_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Created { at, .. }
            | Self::Scheduled { at, .. }
            | Self::Published { at, .. }
            | Self::Archived { at, .. } => *at,
        }
    }

    /// Wrap the event for publication.
    pub fn to_envelope(&self, correlation_id: &str, source: &str) -> DomainEventEnvelope {
        let payload = serde_json::to_value(self).unwrap_or_default();
        DomainEventEnvelope::new(
            self.name(),
            payload,
            EventMeta {
                correlation_id: correlation_id.to_string(),
                domain_id: self.domain_id().clone(),
                source: source.to_string(),
            },
        )
        .occurred_at(self.occurred_at())
    }
}

/// Envelope for a committed ownership transfer.
pub fn ownership_transferred(record: &OwnershipTransfer, source: &str) -> DomainEventEnvelope {
    let payload = serde_json::json!({
        "transferId": record.id,
        "domainId": record.domain_id,
        "fromOrg": record.from_org,
        "toOrg": record.to_org,
        "transferredAt": record.transferred_at,
    });
    DomainEventEnvelope::new(
        OWNERSHIP_TRANSFERRED,
        payload,
        EventMeta {
            correlation_id: record.correlation_id.clone().unwrap_or_default(),
            domain_id: record.domain_id.clone(),
            source: source.to_string(),
        },
    )
    .occurred_at(record.transferred_at)
}
