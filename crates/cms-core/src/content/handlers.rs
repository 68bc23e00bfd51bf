//! Content command handlers.
//!
//! Each handler works on a transaction handle the caller opened. Handlers
//! never check ownership themselves except through the conditional write;
//! callers run them under the ownership guard (or, for archive, accept that a
//! stale read surfaces as `NotFound`).

use chrono::{DateTime, Utc};
use cms_tenant::{DomainId, OrgId};
use tracing::debug;

use crate::store::{rows_applied, StoreError, StoreTransaction};

use super::error::{ContentError, ContentResult};
use super::events::ContentEvent;
use super::model::{ContentItem, ContentQuery, NewContent};

/// A committed or about-to-commit transition.
pub type Transition = (ContentItem, ContentEvent);

/// Insert a new draft.
pub async fn create_draft<T: StoreTransaction>(
    tx: &mut T,
    input: NewContent,
    now: DateTime<Utc>,
) -> ContentResult<Transition> {
    let (item, event) = ContentItem::draft(input, now)?;
    match tx.insert_content(&item).await {
        Ok(()) => Ok((item, event)),
        Err(StoreError::Duplicate(_)) => Err(ContentError::AlreadyExists(item.id)),
        Err(e) => Err(e.into()),
    }
}

/// Publish an item of `domain_id` now.
pub async fn publish_content<T: StoreTransaction>(
    tx: &mut T,
    org_id: &OrgId,
    domain_id: &DomainId,
    content_id: &str,
    now: DateTime<Utc>,
) -> ContentResult<Transition> {
    let current = load_in_domain(tx, domain_id, content_id).await?;
    let (next, event) = current.publish(now)?;
    persist(tx, org_id, &current, &next).await?;
    Ok((next, event))
}

/// Schedule a draft of `domain_id`.
pub async fn schedule_content<T: StoreTransaction>(
    tx: &mut T,
    org_id: &OrgId,
    domain_id: &DomainId,
    content_id: &str,
    publish_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ContentResult<Transition> {
    let current = load_in_domain(tx, domain_id, content_id).await?;
    let (next, event) = current.schedule(publish_at, now)?;
    persist(tx, org_id, &current, &next).await?;
    Ok((next, event))
}

/// Archive an item in any domain `org_id` owns.
///
/// The read is scoped to the caller's domains and the write re-checks
/// ownership, so an ownership change in between yields `NotFound`.
pub async fn archive_content<T: StoreTransaction>(
    tx: &mut T,
    org_id: &OrgId,
    content_id: &str,
    now: DateTime<Utc>,
) -> ContentResult<Transition> {
    let current = tx
        .find_owned_content(content_id, org_id)
        .await?
        .ok_or_else(|| ContentError::NotFound(content_id.to_string()))?;
    let (next, event) = current.archive(now)?;
    persist(tx, org_id, &current, &next).await?;
    Ok((next, event))
}

/// List a domain's content visible to `org_id`.
pub async fn list_content<T: StoreTransaction>(
    tx: &mut T,
    org_id: &OrgId,
    query: ContentQuery,
) -> ContentResult<Vec<ContentItem>> {
    let query = query.normalized();
    Ok(tx.search_content(org_id, &query).await?)
}

/// Publish one due scheduled item on behalf of its domain's owner.
pub async fn publish_due<T: StoreTransaction>(
    tx: &mut T,
    owner: &OrgId,
    content_id: &str,
    now: DateTime<Utc>,
) -> ContentResult<Transition> {
    let current = tx
        .find_owned_content(content_id, owner)
        .await?
        .ok_or_else(|| ContentError::NotFound(content_id.to_string()))?;
    let (next, event) = current.publish_scheduled(now)?;
    persist(tx, owner, &current, &next).await?;
    Ok((next, event))
}

async fn load_in_domain<T: StoreTransaction>(
    tx: &mut T,
    domain_id: &DomainId,
    content_id: &str,
) -> ContentResult<ContentItem> {
    match tx.find_content(content_id).await? {
        Some(item) if &item.domain_id == domain_id => Ok(item),
        _ => Err(ContentError::NotFound(content_id.to_string())),
    }
}

async fn persist<T: StoreTransaction>(
    tx: &mut T,
    org_id: &OrgId,
    current: &ContentItem,
    next: &ContentItem,
) -> ContentResult<()> {
    let affected = tx.save_transition(org_id, current.status, next).await?;
    if rows_applied(affected) {
        return Ok(());
    }
    debug!(
        content_id = %next.id,
        prior = %current.status,
        ?affected,
        "Conditional content write matched no row"
    );
    Err(ContentError::NotFound(next.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentStatus;
    use crate::store::{IsolationLevel, MemoryStore, TenancyStore};
    use chrono::Duration;
    use cms_tenant::DomainOwnership;

    fn domain() -> DomainId {
        DomainId::new("blog.acme.test")
    }

    fn input(id: &str) -> NewContent {
        NewContent {
            id: id.into(),
            domain_id: domain(),
            title: "Launch".into(),
            body: "We shipped.".into(),
            content_type: "post".into(),
        }
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .register_domain(&DomainOwnership::new(domain(), OrgId::new("org-a")))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_then_duplicate() {
        let store = store().await;
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        create_draft(&mut tx, input("post-0001"), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let err = create_draft(&mut tx, input("post-0001"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_publish_wrong_domain_is_not_found() {
        let store = store().await;
        let org = OrgId::new("org-a");
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        create_draft(&mut tx, input("post-0001"), Utc::now())
            .await
            .unwrap();

        let err = publish_content(&mut tx, &org, &DomainId::new("other"), "post-0001", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));

        let (item, _) = publish_content(&mut tx, &org, &domain(), "post-0001", Utc::now())
            .await
            .unwrap();
        assert_eq!(item.status, ContentStatus::Published);
    }

    #[tokio::test]
    async fn test_archive_by_non_owner_is_not_found() {
        let store = store().await;
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        create_draft(&mut tx, input("post-0001"), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let err = archive_content(&mut tx, &OrgId::new("org-b"), "post-0001", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_due_only_when_time_has_come() {
        let store = store().await;
        let org = OrgId::new("org-a");
        let now = Utc::now();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        create_draft(&mut tx, input("post-0001"), now).await.unwrap();
        schedule_content(&mut tx, &org, &domain(), "post-0001", now + Duration::hours(1), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.due_scheduled(now, 10).await.unwrap().is_empty());
        assert!(publish_due(&mut tx, &org, "post-0001", now).await.is_err());

        let later = now + Duration::hours(2);
        assert_eq!(tx.due_scheduled(later, 10).await.unwrap().len(), 1);
        let (item, event) = publish_due(&mut tx, &org, "post-0001", later).await.unwrap();
        assert_eq!(item.status, ContentStatus::Published);
        assert!(matches!(
            event,
            ContentEvent::Published {
                was_scheduled: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_title() {
        let store = store().await;
        let org = OrgId::new("org-a");
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        create_draft(&mut tx, input("post-0001"), Utc::now())
            .await
            .unwrap();
        create_draft(
            &mut tx,
            NewContent {
                title: "Roadmap".into(),
                ..input("post-0002")
            },
            Utc::now(),
        )
        .await
        .unwrap();
        publish_content(&mut tx, &org, &domain(), "post-0002", Utc::now())
            .await
            .unwrap();

        let drafts = list_content(
            &mut tx,
            &org,
            ContentQuery::new(domain()).with_status(ContentStatus::Draft),
        )
        .await
        .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, "post-0001");

        let found = list_content(&mut tx, &org, ContentQuery::new(domain()).with_search("ROAD"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "post-0002");

        let by_body = list_content(&mut tx, &org, ContentQuery::new(domain()).with_search("shipped"))
            .await
            .unwrap();
        assert!(by_body.is_empty());
    }
}
