//! Domain event envelope
//!
//! Every committed lifecycle transition and every ownership transfer is
//! published as one immutable [`DomainEventEnvelope`]. Downstream consumers
//! (billing, search indexing, notification fan-out) subscribe by event name.

use chrono::{DateTime, Utc};
use cms_tenant::DomainId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Envelope metadata used for correlation and routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Request id of the command that produced the event
    pub correlation_id: String,

    /// Domain the event concerns
    pub domain_id: DomainId,

    /// Emitting service name
    pub source: String,
}

/// Immutable record emitted for a committed state change.
///
/// # Example
///
/// ```
/// use cms_events::{DomainEventEnvelope, EventMeta};
/// use cms_tenant::DomainId;
///
/// let envelope = DomainEventEnvelope::new(
///     "content.published",
///     serde_json::json!({ "contentId": "page-0001" }),
///     EventMeta {
///         correlation_id: "req-1".into(),
///         domain_id: DomainId::new("blog.acme.test"),
///         source: "cms-core".into(),
///     },
/// );
///
/// assert_eq!(envelope.topic(), "content.published");
/// assert_eq!(envelope.version, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event name, dotted (e.g. "content.archived")
    pub name: String,

    /// Schema version of the payload
    pub version: u32,

    /// When the change committed
    pub occurred_at: DateTime<Utc>,

    /// Event payload
    pub payload: serde_json::Value,

    /// Correlation and routing metadata
    pub meta: EventMeta,
}

impl DomainEventEnvelope {
    /// Create a new envelope stamped with the current time.
    pub fn new(name: impl Into<String>, payload: serde_json::Value, meta: EventMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            version: ENVELOPE_VERSION,
            occurred_at: Utc::now(),
            payload,
            meta,
        }
    }

    /// Override the occurrence time.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    /// Topic used for bus routing. Envelope names are already dotted topics.
    pub fn topic(&self) -> &str {
        &self.name
    }

    /// Deserialize the payload into a typed value.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EventMeta {
        EventMeta {
            correlation_id: "req-42".to_string(),
            domain_id: DomainId::new("d1"),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let envelope = DomainEventEnvelope::new("content.created", serde_json::json!({}), meta());
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["name"], "content.created");
        assert_eq!(json["version"], 1);
        assert!(json.get("occurredAt").is_some());
        assert_eq!(json["meta"]["correlationId"], "req-42");
        assert_eq!(json["meta"]["domainId"], "d1");
    }

    #[test]
    fn test_parse_payload() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            content_id: String,
        }

        let envelope = DomainEventEnvelope::new(
            "content.published",
            serde_json::json!({ "contentId": "page-0001" }),
            meta(),
        );
        let payload: Payload = envelope.parse_payload().unwrap();
        assert_eq!(payload.content_id, "page-0001");
    }
}
