//! Content service: ownership guard, command handler and event emission
//! composed into one call per command.
//!
//! Events are published only after the transaction that produced them has
//! committed. A publish failure is logged and does not undo the command.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cms_events::{DomainEventEnvelope, EventBus};
use cms_tenant::{DomainId, OrgId, OwnershipTransfer};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::guard::OwnershipGuard;
use crate::store::{IsolationLevel, StoreTransaction, TenancyStore};

use super::error::{ContentError, ContentResult};
use super::events::{self, ContentEvent};
use super::handlers;
use super::model::{ContentItem, ContentQuery, NewContent};

/// Default `meta.source` of emitted envelopes.
pub const DEFAULT_EVENT_SOURCE: &str = "cms-core";

/// Who is issuing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub org_id: OrgId,
    /// Request id, copied into event metadata
    pub correlation_id: String,
}

impl Actor {
    pub fn new(org_id: OrgId, correlation_id: impl Into<String>) -> Self {
        Self {
            org_id,
            correlation_id: correlation_id.into(),
        }
    }
}

/// Result of a committed content command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentReceipt {
    pub item: ContentItem,
    pub event: DomainEventEnvelope,
}

/// Result of a committed ownership transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer: OwnershipTransfer,
    pub event: DomainEventEnvelope,
}

/// Content commands for one store.
pub struct ContentService<S: TenancyStore> {
    guard: OwnershipGuard<S>,
    bus: Arc<dyn EventBus>,
    source: String,
}

impl<S: TenancyStore> ContentService<S> {
    pub fn new(guard: OwnershipGuard<S>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            guard,
            bus,
            source: DEFAULT_EVENT_SOURCE.to_string(),
        }
    }

    /// Set `meta.source` on emitted envelopes.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn guard(&self) -> &OwnershipGuard<S> {
        &self.guard
    }

    /// Create a draft in a domain the actor owns.
    #[instrument(skip(self, input), fields(org_id = %actor.org_id, content_id = %input.id))]
    pub async fn create_draft(
        &self,
        actor: &Actor,
        input: NewContent,
    ) -> ContentResult<ContentReceipt> {
        input.validate()?;
        let domain_id = input.domain_id.clone();
        let now = Utc::now();

        let (item, event) = self
            .guard
            .with_ownership_check(&actor.org_id, &domain_id, move |tx| {
                Box::pin(async move { handlers::create_draft(tx, input, now).await })
            })
            .await?;

        Ok(self.emit(&actor.correlation_id, item, &event).await)
    }

    /// Publish an item now.
    #[instrument(skip(self), fields(org_id = %actor.org_id))]
    pub async fn publish(
        &self,
        actor: &Actor,
        domain_id: &DomainId,
        content_id: &str,
    ) -> ContentResult<ContentReceipt> {
        let (org, domain, id) = (actor.org_id.clone(), domain_id.clone(), content_id.to_string());
        let now = Utc::now();

        let (item, event) = self
            .guard
            .with_ownership_check(&actor.org_id, domain_id, move |tx| {
                Box::pin(async move {
                    handlers::publish_content(tx, &org, &domain, &id, now).await
                })
            })
            .await?;

        Ok(self.emit(&actor.correlation_id, item, &event).await)
    }

    /// Schedule a draft for `publish_at`.
    #[instrument(skip(self), fields(org_id = %actor.org_id))]
    pub async fn schedule(
        &self,
        actor: &Actor,
        domain_id: &DomainId,
        content_id: &str,
        publish_at: DateTime<Utc>,
    ) -> ContentResult<ContentReceipt> {
        let (org, domain, id) = (actor.org_id.clone(), domain_id.clone(), content_id.to_string());
        let now = Utc::now();

        let (item, event) = self
            .guard
            .with_ownership_check(&actor.org_id, domain_id, move |tx| {
                Box::pin(async move {
                    handlers::schedule_content(tx, &org, &domain, &id, publish_at, now).await
                })
            })
            .await?;

        Ok(self.emit(&actor.correlation_id, item, &event).await)
    }

    /// Archive an item in any domain the actor owns.
    ///
    /// Runs at read committed without the guard lock: ownership is checked by
    /// the scoped read and again by the conditional write, so a caller whose
    /// organization lost the domain in between gets `NotFound`.
    #[instrument(skip(self), fields(org_id = %actor.org_id))]
    pub async fn archive(&self, actor: &Actor, content_id: &str) -> ContentResult<ContentReceipt> {
        let mut tx = self
            .guard
            .store()
            .begin(IsolationLevel::ReadCommitted)
            .await?;
        let result = handlers::archive_content(&mut tx, &actor.org_id, content_id, Utc::now()).await;
        let (item, event) = finish(tx, result).await?;

        Ok(self.emit(&actor.correlation_id, item, &event).await)
    }

    /// List a domain's content. Title-only search.
    #[instrument(skip(self, query), fields(org_id = %actor.org_id, domain_id = %query.domain_id))]
    pub async fn list(&self, actor: &Actor, query: ContentQuery) -> ContentResult<Vec<ContentItem>> {
        self.guard
            .assert_ownership(&actor.org_id, &query.domain_id)
            .await?;

        let mut tx = self
            .guard
            .store()
            .begin(IsolationLevel::ReadCommitted)
            .await?;
        let result = handlers::list_content(&mut tx, &actor.org_id, query).await;
        finish(tx, result).await
    }

    /// Publish scheduled items whose time has passed, at most `limit`.
    ///
    /// Each item is published in its own guarded transaction on behalf of
    /// its domain's current owner. Items that changed concurrently are skipped.
    pub async fn publish_due(&self, limit: u32) -> ContentResult<Vec<ContentReceipt>> {
        self.publish_due_at(Utc::now(), limit).await
    }

    /// [`publish_due`](Self::publish_due) evaluated at `now`.
    #[instrument(skip(self))]
    pub async fn publish_due_at(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> ContentResult<Vec<ContentReceipt>> {
        let store = self.guard.store();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await?;
        let due = tx.due_scheduled(now, limit).await;
        let due = finish(tx, due.map_err(ContentError::from)).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let correlation_id = format!("scheduled-publish-{}", Uuid::now_v7());
        let mut receipts = Vec::with_capacity(due.len());

        for item in due {
            let Some(owner) = store.domain_owner(&item.domain_id).await? else {
                warn!(content_id = %item.id, domain_id = %item.domain_id, "Due item has no domain owner");
                continue;
            };

            let (org, id) = (owner.clone(), item.id.clone());
            let published = self
                .guard
                .with_ownership_check(&owner, &item.domain_id, move |tx| {
                    Box::pin(async move { handlers::publish_due(tx, &org, &id, now).await })
                })
                .await;

            match published {
                Ok((next, event)) => {
                    receipts.push(self.emit(&correlation_id, next, &event).await);
                }
                Err(e @ (ContentError::NotFound(_)
                | ContentError::InvalidTransition { .. }
                | ContentError::Guard(_))) => {
                    debug!(content_id = %item.id, error = %e, "Skipping due item changed concurrently");
                }
                Err(e) => return Err(e),
            }
        }

        info!(published = receipts.len(), "Scheduled publish sweep finished");
        Ok(receipts)
    }

    /// Transfer a domain from the actor's organization to `to_org`.
    #[instrument(skip(self), fields(org_id = %actor.org_id))]
    pub async fn transfer_domain(
        &self,
        actor: &Actor,
        domain_id: &DomainId,
        to_org: &OrgId,
    ) -> ContentResult<TransferReceipt> {
        let transfer = self
            .guard
            .transfer_ownership(domain_id, &actor.org_id, to_org, Some(&actor.correlation_id))
            .await?;

        let event = events::ownership_transferred(&transfer, &self.source);
        self.publish_envelope(event.clone()).await;
        Ok(TransferReceipt { transfer, event })
    }

    async fn emit(
        &self,
        correlation_id: &str,
        item: ContentItem,
        event: &ContentEvent,
    ) -> ContentReceipt {
        let envelope = event.to_envelope(correlation_id, &self.source);
        self.publish_envelope(envelope.clone()).await;
        ContentReceipt {
            item,
            event: envelope,
        }
    }

    async fn publish_envelope(&self, envelope: DomainEventEnvelope) {
        let name = envelope.name.clone();
        if let Err(e) = self.bus.publish(envelope).await {
            warn!(event = %name, error = %e, "Failed to publish domain event");
        }
    }
}

/// Commit on success, roll back on failure.
async fn finish<Tx: StoreTransaction, T>(tx: Tx, result: ContentResult<T>) -> ContentResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
