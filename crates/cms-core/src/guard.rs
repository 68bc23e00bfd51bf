//! Ownership guard.
//!
//! Every mutation of domain-scoped content runs inside a transaction that has
//! locked the caller's ownership row, so a concurrent transfer waits until the
//! mutation commits or rolls back. Transfers themselves run serializable and
//! are retried on serialization conflicts.

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use cms_tenant::{DomainId, DomainOwnership, OrgId, OwnershipTransfer};

use crate::retry::{with_retry_if, RetryConfig};
use crate::store::{rows_applied, IsolationLevel, StoreError, StoreTransaction, TenancyStore};

/// Guard errors.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("organization {org_id} does not own domain {domain_id}")]
    NotOwned { org_id: OrgId, domain_id: DomainId },

    /// The ownership update matched no row
    #[error("ownership transfer of domain {domain_id} was not applied")]
    TransferNotApplied { domain_id: DomainId },

    #[error("domain {domain_id} is already registered")]
    AlreadyRegistered { domain_id: DomainId },

    #[error("domain is already owned by the target organization")]
    SameOrganization,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GuardError {
    pub fn is_serialization_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_serialization_conflict())
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotOwned { .. } => "DOMAIN_NOT_OWNED",
            Self::TransferNotApplied { .. } => "TRANSFER_NOT_APPLIED",
            Self::AlreadyRegistered { .. } => "DOMAIN_ALREADY_REGISTERED",
            Self::SameOrganization => "SAME_ORGANIZATION",
            Self::Store(e) => e.error_code(),
        }
    }

    fn not_owned(org_id: &OrgId, domain_id: &DomainId) -> Self {
        Self::NotOwned {
            org_id: org_id.clone(),
            domain_id: domain_id.clone(),
        }
    }
}

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Guard settings.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Backoff for serialization conflicts during transfers
    pub retry: RetryConfig,

    /// Upper bound on any single statement or lock wait
    pub statement_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::conflict(),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

/// Enforces that only the owning organization mutates a domain's content.
#[derive(Debug, Clone)]
pub struct OwnershipGuard<S> {
    store: S,
    config: GuardConfig,
}

impl<S: TenancyStore> OwnershipGuard<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, GuardConfig::default())
    }

    pub fn with_config(store: S, config: GuardConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Record the initial owner of a domain.
    #[instrument(skip(self))]
    pub async fn register_domain(
        &self,
        domain_id: &DomainId,
        org_id: &OrgId,
    ) -> GuardResult<DomainOwnership> {
        let ownership = DomainOwnership::new(domain_id.clone(), org_id.clone());
        match self.store.register_domain(&ownership).await {
            Ok(()) => {
                info!(domain_id = %domain_id, org_id = %org_id, "Domain registered");
                Ok(ownership)
            }
            Err(StoreError::Duplicate(_)) => Err(GuardError::AlreadyRegistered {
                domain_id: domain_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fail with `NotOwned` unless `org_id` owns `domain_id` right now.
    pub async fn assert_ownership(&self, org_id: &OrgId, domain_id: &DomainId) -> GuardResult<()> {
        if self.store.ownership_exists(org_id, domain_id).await? {
            Ok(())
        } else {
            Err(GuardError::not_owned(org_id, domain_id))
        }
    }

    /// Like [`assert_ownership`](Self::assert_ownership), and also locks the
    /// ownership row until `tx` finishes.
    pub async fn assert_ownership_locked(
        &self,
        tx: &mut S::Tx,
        org_id: &OrgId,
        domain_id: &DomainId,
    ) -> GuardResult<()> {
        if tx.lock_ownership(org_id, domain_id).await? {
            Ok(())
        } else {
            Err(GuardError::not_owned(org_id, domain_id))
        }
    }

    /// Open a repeatable-read transaction holding the ownership lock.
    ///
    /// The caller finishes it; dropping it rolls back.
    #[instrument(skip(self))]
    pub async fn begin_guarded(&self, org_id: &OrgId, domain_id: &DomainId) -> GuardResult<S::Tx> {
        let mut tx = self.store.begin(IsolationLevel::RepeatableRead).await?;
        self.assert_ownership_locked(&mut tx, org_id, domain_id)
            .await?;
        Ok(tx)
    }

    /// Run `f` in a transaction that holds the ownership lock. Commits when
    /// `f` succeeds, rolls back and returns its error otherwise.
    ///
    /// `f` is bounded by the configured statement timeout so a stalled
    /// operation cannot hold the ownership lock indefinitely.
    ///
    /// ```rust,no_run
    /// # use cms_core::{MemoryStore, OwnershipGuard, GuardError, StoreTransaction};
    /// # use cms_tenant::{DomainId, OrgId};
    /// # async fn example(guard: OwnershipGuard<MemoryStore>) -> Result<(), GuardError> {
    /// let found = guard
    ///     .with_ownership_check(&OrgId::new("org-a"), &DomainId::new("d1"), |tx| {
    ///         Box::pin(async move { Ok::<_, GuardError>(tx.find_content("page-0001").await?) })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_ownership_check<T, E, F>(
        &self,
        org_id: &OrgId,
        domain_id: &DomainId,
        f: F,
    ) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<GuardError> + Send,
    {
        let mut tx = self.begin_guarded(org_id, domain_id).await?;

        let limit = self.config.statement_timeout;
        let outcome = match tokio::time::timeout(limit, f(&mut tx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    %org_id,
                    %domain_id,
                    timeout_ms = limit.as_millis() as u64,
                    "Guarded operation timed out"
                );
                Err(GuardError::Store(StoreError::Timeout).into())
            }
        };

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(GuardError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed guarded operation failed");
                }
                Err(err)
            }
        }
    }

    /// Move a domain from `from_org` to `to_org`.
    ///
    /// Retried on serialization conflicts only. A transfer from an
    /// organization that does not own the domain leaves nothing behind.
    #[instrument(skip(self, correlation_id))]
    pub async fn transfer_ownership(
        &self,
        domain_id: &DomainId,
        from_org: &OrgId,
        to_org: &OrgId,
        correlation_id: Option<&str>,
    ) -> GuardResult<OwnershipTransfer> {
        if from_org == to_org {
            return Err(GuardError::SameOrganization);
        }

        let record = with_retry_if(
            &self.config.retry,
            || self.try_transfer(domain_id, from_org, to_org, correlation_id),
            GuardError::is_serialization_conflict,
        )
        .await?;

        info!(
            transfer_id = %record.id,
            domain_id = %domain_id,
            from_org = %from_org,
            to_org = %to_org,
            "Domain ownership transferred"
        );
        Ok(record)
    }

    async fn try_transfer(
        &self,
        domain_id: &DomainId,
        from_org: &OrgId,
        to_org: &OrgId,
        correlation_id: Option<&str>,
    ) -> GuardResult<OwnershipTransfer> {
        let mut tx = self.store.begin(IsolationLevel::Serializable).await?;

        let current = tx.lock_domain_owner(domain_id).await?;
        if current.as_ref() != Some(from_org) {
            debug!(domain_id = %domain_id, "Transfer source is not the current owner");
            tx.rollback().await?;
            return Err(GuardError::not_owned(from_org, domain_id));
        }

        let mut record = OwnershipTransfer::new(domain_id.clone(), from_org.clone(), to_org.clone());
        if let Some(correlation_id) = correlation_id {
            record = record.with_correlation_id(correlation_id);
        }

        let affected = tx
            .reassign_owner(domain_id, from_org, to_org, record.transferred_at)
            .await?;
        if !rows_applied(affected) {
            warn!(domain_id = %domain_id, ?affected, "Ownership update matched no row");
            return Err(GuardError::TransferNotApplied {
                domain_id: domain_id.clone(),
            });
        }

        tx.record_transfer(&record).await?;
        tx.commit().await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ids() -> (DomainId, OrgId, OrgId) {
        (DomainId::new("d1"), OrgId::new("org-a"), OrgId::new("org-b"))
    }

    async fn guard() -> OwnershipGuard<MemoryStore> {
        let (domain, a, _) = ids();
        let guard = OwnershipGuard::new(MemoryStore::new());
        guard.register_domain(&domain, &a).await.unwrap();
        guard
    }

    #[tokio::test]
    async fn test_assert_ownership() {
        let guard = guard().await;
        let (domain, a, b) = ids();

        assert!(guard.assert_ownership(&a, &domain).await.is_ok());
        assert!(matches!(
            guard.assert_ownership(&b, &domain).await,
            Err(GuardError::NotOwned { .. })
        ));
        assert!(matches!(
            guard.assert_ownership(&a, &DomainId::new("other")).await,
            Err(GuardError::NotOwned { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_twice() {
        let guard = guard().await;
        let (domain, _, b) = ids();
        assert!(matches!(
            guard.register_domain(&domain, &b).await,
            Err(GuardError::AlreadyRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_moves_ownership_and_audits() {
        let guard = guard().await;
        let (domain, a, b) = ids();

        let record = guard
            .transfer_ownership(&domain, &a, &b, Some("req-1"))
            .await
            .unwrap();
        assert_eq!(record.from_org, a);
        assert_eq!(record.to_org, b);
        assert_eq!(record.correlation_id.as_deref(), Some("req-1"));

        assert_eq!(guard.store().owner_of(&domain), Some(b.clone()));
        assert_eq!(guard.store().transfers(), vec![record]);
        assert!(guard.assert_ownership(&a, &domain).await.is_err());
        assert!(guard.assert_ownership(&b, &domain).await.is_ok());
    }

    #[tokio::test]
    async fn test_transfer_from_non_owner_has_no_side_effects() {
        let guard = guard().await;
        let (domain, a, b) = ids();
        let c = OrgId::new("org-c");

        let err = guard
            .transfer_ownership(&domain, &b, &c, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::NotOwned { .. }));
        assert_eq!(guard.store().owner_of(&domain), Some(a));
        assert!(guard.store().transfers().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_to_self_is_rejected() {
        let guard = guard().await;
        let (domain, a, _) = ids();
        assert!(matches!(
            guard.transfer_ownership(&domain, &a, &a, None).await,
            Err(GuardError::SameOrganization)
        ));
    }

    #[tokio::test]
    async fn test_with_ownership_check_rolls_back_on_error() {
        use crate::content::{ContentItem, NewContent};
        use chrono::Utc;

        let guard = guard().await;
        let (domain, a, b) = ids();
        let (item, _) = ContentItem::draft(
            NewContent {
                id: "page-0001".into(),
                domain_id: domain.clone(),
                title: "t".into(),
                body: "b".into(),
                content_type: "page".into(),
            },
            Utc::now(),
        )
        .unwrap();

        let failing = item.clone();
        let result: Result<(), GuardError> = guard
            .with_ownership_check(&a, &domain, move |tx| {
                Box::pin(async move {
                    tx.insert_content(&failing).await?;
                    Err(GuardError::SameOrganization)
                })
            })
            .await;
        assert!(result.is_err());
        assert!(guard.store().content("page-0001").is_none());

        let denied: Result<(), GuardError> = guard
            .with_ownership_check(&b, &domain, |_tx| Box::pin(async { Ok(()) }))
            .await;
        assert!(matches!(denied, Err(GuardError::NotOwned { .. })));

        let committed = item.clone();
        guard
            .with_ownership_check(&a, &domain, move |tx| {
                Box::pin(async move {
                    tx.insert_content(&committed).await?;
                    Ok::<_, GuardError>(())
                })
            })
            .await
            .unwrap();
        assert_eq!(guard.store().content("page-0001"), Some(item));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_work_is_bounded_by_statement_timeout() {
        let (domain, a, b) = ids();
        let config = GuardConfig {
            statement_timeout: Duration::from_secs(1),
            ..GuardConfig::default()
        };
        let guard = OwnershipGuard::with_config(MemoryStore::new(), config);
        guard.register_domain(&domain, &a).await.unwrap();

        let err = guard
            .with_ownership_check(&a, &domain, |_tx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, GuardError>(())
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Store(StoreError::Timeout)));

        // the lock went with the rolled-back transaction
        guard
            .transfer_ownership(&domain, &a, &b, None)
            .await
            .unwrap();
    }
}
