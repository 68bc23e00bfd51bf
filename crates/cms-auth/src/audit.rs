//! Authentication audit trail.
//!
//! Every verification outcome is recorded with the client address, user agent,
//! and a failure classification. Raw tokens and library error text never
//! reach an audit record.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use cms_tenant::OrgId;
use parking_lot::Mutex;
use serde::Serialize;

/// Outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthAuditEvent {
    pub outcome: AuditOutcome,
    /// Failure classification, `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<&'static str>,
    pub client_ip: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    /// Served from the verified-token cache
    pub cached: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuthAuditEvent);
}

/// Writes audit records to the `cms::audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuthAuditEvent) {
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "cms::audit",
                outcome = "success",
                client_ip = %event.client_ip,
                user_agent = event.user_agent.as_deref().unwrap_or("-"),
                request_id = %event.request_id,
                user_id = event.user_id.as_deref().unwrap_or("-"),
                org_id = event.org_id.as_ref().map(OrgId::as_str).unwrap_or("-"),
                cached = event.cached,
                "Token verified"
            ),
            AuditOutcome::Failure => tracing::warn!(
                target: "cms::audit",
                outcome = "failure",
                classification = event.classification.unwrap_or("unknown"),
                client_ip = %event.client_ip,
                user_agent = event.user_agent.as_deref().unwrap_or("-"),
                request_id = %event.request_id,
                "Token rejected"
            ),
        }
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuthAuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthAuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<AuthAuditEvent> {
        self.events.lock().last().cloned()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuthAuditEvent) {
        self.events.lock().push(event);
    }
}
