//! In-process storage backend.
//!
//! Emulates the parts of a relational store the guard depends on:
//!
//! - row locks: `lock_*`, `insert_content` and `save_transition` take an async
//!   per-row mutex held until the transaction finishes; waits are bounded by the
//!   statement timeout
//! - snapshots: each committed transaction bumps a sequence number and stamps
//!   the rows it wrote; under repeatable read or serializable isolation, locking
//!   a row stamped after the transaction began is a serialization conflict
//! - buffered writes: nothing is visible to other transactions before commit,
//!   and dropping a transaction discards its writes
//!
//! Plain reads see the latest committed state plus the transaction's own writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cms_tenant::{DomainId, DomainOwnership, OrgId, OwnershipTransfer};
use parking_lot::Mutex;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::{debug, warn};

use super::{IsolationLevel, StoreError, StoreResult, StoreTransaction, TenancyStore};
use crate::content::{ContentItem, ContentQuery, ContentStatus};

const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Ownership(DomainId),
    Content(String),
}

#[derive(Debug, Clone)]
struct OwnershipRow {
    org_id: OrgId,
    since: DateTime<Utc>,
    version: u64,
}

#[derive(Debug, Clone)]
struct ContentRow {
    item: ContentItem,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    ownership: HashMap<DomainId, OwnershipRow>,
    transfers: Vec<OwnershipTransfer>,
    content: HashMap<String, ContentRow>,
    commit_seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.commit_seq += 1;
        self.commit_seq
    }
}

struct Shared {
    state: Mutex<State>,
    locks: Mutex<HashMap<RowKey, Arc<RowLock<()>>>>,
    statement_timeout: Duration,
}

/// Shared handle to an in-memory store. Clones see the same data.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MemoryStore")
            .field("domains", &state.ownership.len())
            .field("content", &state.content.len())
            .field("commit_seq", &state.commit_seq)
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_statement_timeout(DEFAULT_STATEMENT_TIMEOUT)
    }

    /// Bound row-lock waits.
    pub fn with_statement_timeout(statement_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                locks: Mutex::new(HashMap::new()),
                statement_timeout,
            }),
        }
    }

    /// Committed owner of a domain.
    pub fn owner_of(&self, domain_id: &DomainId) -> Option<OrgId> {
        self.shared
            .state
            .lock()
            .ownership
            .get(domain_id)
            .map(|row| row.org_id.clone())
    }

    /// Committed ownership fact of a domain.
    pub fn ownership(&self, domain_id: &DomainId) -> Option<DomainOwnership> {
        self.shared
            .state
            .lock()
            .ownership
            .get(domain_id)
            .map(|row| DomainOwnership {
                domain_id: domain_id.clone(),
                org_id: row.org_id.clone(),
                since: row.since,
            })
    }

    /// Committed transfer audit records, oldest first.
    pub fn transfers(&self) -> Vec<OwnershipTransfer> {
        self.shared.state.lock().transfers.clone()
    }

    /// Committed state of one item.
    pub fn content(&self, id: &str) -> Option<ContentItem> {
        self.shared
            .state
            .lock()
            .content
            .get(id)
            .map(|row| row.item.clone())
    }
}

#[async_trait]
impl TenancyStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self, isolation: IsolationLevel) -> StoreResult<MemoryTransaction> {
        let snapshot = self.shared.state.lock().commit_seq;
        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            isolation,
            snapshot,
            held: HashMap::new(),
            writes: Vec::new(),
        })
    }

    async fn ownership_exists(&self, org_id: &OrgId, domain_id: &DomainId) -> StoreResult<bool> {
        Ok(self.owner_of(domain_id).as_ref() == Some(org_id))
    }

    async fn domain_owner(&self, domain_id: &DomainId) -> StoreResult<Option<OrgId>> {
        Ok(self.owner_of(domain_id))
    }

    async fn register_domain(&self, ownership: &DomainOwnership) -> StoreResult<()> {
        let mut state = self.shared.state.lock();
        if state.ownership.contains_key(&ownership.domain_id) {
            return Err(StoreError::Duplicate(ownership.domain_id.to_string()));
        }
        let version = state.next_seq();
        state.ownership.insert(
            ownership.domain_id.clone(),
            OwnershipRow {
                org_id: ownership.org_id.clone(),
                since: ownership.since,
                version,
            },
        );
        Ok(())
    }
}

#[derive(Debug)]
enum Write {
    Owner {
        domain_id: DomainId,
        org_id: OrgId,
        since: DateTime<Utc>,
    },
    Transfer(OwnershipTransfer),
    Content(ContentItem),
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    isolation: IsolationLevel,
    snapshot: u64,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    async fn lock(&mut self, key: RowKey) -> StoreResult<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let row = self.shared.locks.lock().entry(key.clone()).or_default().clone();
        let guard = tokio::time::timeout(self.shared.statement_timeout, row.lock_owned())
            .await
            .map_err(|_| {
                warn!(row = ?key, "Row lock wait timed out");
                StoreError::Timeout
            })?;
        self.held.insert(key, guard);
        Ok(())
    }

    fn check_snapshot(&self, version: u64) -> StoreResult<()> {
        if self.isolation.uses_snapshot() && version > self.snapshot {
            return Err(StoreError::SerializationConflict);
        }
        Ok(())
    }

    /// Owner as seen by this transaction, checking the snapshot when the
    /// row is locked.
    fn owner(&self, domain_id: &DomainId, locked: bool) -> StoreResult<Option<OrgId>> {
        let pending = self.writes.iter().rev().find_map(|w| match w {
            Write::Owner {
                domain_id: d,
                org_id,
                ..
            } if d == domain_id => Some(org_id.clone()),
            _ => None,
        });
        if pending.is_some() {
            return Ok(pending);
        }

        let state = self.shared.state.lock();
        match state.ownership.get(domain_id) {
            Some(row) => {
                if locked {
                    self.check_snapshot(row.version)?;
                }
                Ok(Some(row.org_id.clone()))
            }
            None => Ok(None),
        }
    }

    fn item(&self, id: &str, locked: bool) -> StoreResult<Option<ContentItem>> {
        let pending = self.writes.iter().rev().find_map(|w| match w {
            Write::Content(item) if item.id == id => Some(item.clone()),
            _ => None,
        });
        if pending.is_some() {
            return Ok(pending);
        }

        let state = self.shared.state.lock();
        match state.content.get(id) {
            Some(row) => {
                if locked {
                    self.check_snapshot(row.version)?;
                }
                Ok(Some(row.item.clone()))
            }
            None => Ok(None),
        }
    }

    /// Committed items overlaid with this transaction's writes.
    fn visible_items(&self) -> Vec<ContentItem> {
        let mut items: HashMap<String, ContentItem> = self
            .shared
            .state
            .lock()
            .content
            .iter()
            .map(|(id, row)| (id.clone(), row.item.clone()))
            .collect();
        for write in &self.writes {
            if let Write::Content(item) = write {
                items.insert(item.id.clone(), item.clone());
            }
        }
        items.into_values().collect()
    }

    fn release(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let keys: Vec<RowKey> = self.held.drain().map(|(key, _guard)| key).collect();
        let mut locks = self.shared.locks.lock();
        for key in keys {
            if locks.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
                locks.remove(&key);
            }
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.writes.is_empty() {
            debug!(
                pending_writes = self.writes.len(),
                "Transaction dropped without commit, rolling back"
            );
            self.writes.clear();
        }
        self.release();
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_ownership(&mut self, org_id: &OrgId, domain_id: &DomainId) -> StoreResult<bool> {
        self.lock(RowKey::Ownership(domain_id.clone())).await?;
        Ok(self.owner(domain_id, true)?.as_ref() == Some(org_id))
    }

    async fn lock_domain_owner(&mut self, domain_id: &DomainId) -> StoreResult<Option<OrgId>> {
        self.lock(RowKey::Ownership(domain_id.clone())).await?;
        self.owner(domain_id, true)
    }

    async fn reassign_owner(
        &mut self,
        domain_id: &DomainId,
        from: &OrgId,
        to: &OrgId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<u64>> {
        self.lock(RowKey::Ownership(domain_id.clone())).await?;
        if self.owner(domain_id, true)?.as_ref() != Some(from) {
            return Ok(Some(0));
        }
        self.writes.push(Write::Owner {
            domain_id: domain_id.clone(),
            org_id: to.clone(),
            since: at,
        });
        Ok(Some(1))
    }

    async fn record_transfer(&mut self, record: &OwnershipTransfer) -> StoreResult<()> {
        self.writes.push(Write::Transfer(record.clone()));
        Ok(())
    }

    async fn insert_content(&mut self, item: &ContentItem) -> StoreResult<()> {
        self.lock(RowKey::Content(item.id.clone())).await?;
        if self.item(&item.id, false)?.is_some() {
            return Err(StoreError::Duplicate(item.id.clone()));
        }
        self.writes.push(Write::Content(item.clone()));
        Ok(())
    }

    async fn find_content(&mut self, id: &str) -> StoreResult<Option<ContentItem>> {
        self.item(id, false)
    }

    async fn find_owned_content(
        &mut self,
        id: &str,
        org_id: &OrgId,
    ) -> StoreResult<Option<ContentItem>> {
        let Some(item) = self.item(id, false)? else {
            return Ok(None);
        };
        let owned = self.owner(&item.domain_id, false)?.as_ref() == Some(org_id);
        Ok(owned.then_some(item))
    }

    async fn save_transition(
        &mut self,
        org_id: &OrgId,
        prior: ContentStatus,
        item: &ContentItem,
    ) -> StoreResult<Option<u64>> {
        self.lock(RowKey::Content(item.id.clone())).await?;
        let Some(current) = self.item(&item.id, true)? else {
            return Ok(Some(0));
        };
        if current.status != prior {
            return Ok(Some(0));
        }
        if self.owner(&current.domain_id, false)?.as_ref() != Some(org_id) {
            return Ok(Some(0));
        }
        self.writes.push(Write::Content(item.clone()));
        Ok(Some(1))
    }

    async fn search_content(
        &mut self,
        org_id: &OrgId,
        query: &ContentQuery,
    ) -> StoreResult<Vec<ContentItem>> {
        if self.owner(&query.domain_id, false)?.as_ref() != Some(org_id) {
            return Ok(Vec::new());
        }
        let mut items: Vec<ContentItem> = self
            .visible_items()
            .into_iter()
            .filter(|item| query.matches(item))
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn due_scheduled(
        &mut self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<ContentItem>> {
        let mut items: Vec<ContentItem> = self
            .visible_items()
            .into_iter()
            .filter(|item| item.is_due(now))
            .collect();
        items.sort_by(|a, b| a.publish_at.cmp(&b.publish_at).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn commit(mut self) -> StoreResult<()> {
        let writes = std::mem::take(&mut self.writes);
        if !writes.is_empty() {
            let mut state = self.shared.state.lock();
            let version = state.next_seq();
            for write in writes {
                match write {
                    Write::Owner {
                        domain_id,
                        org_id,
                        since,
                    } => {
                        state.ownership.insert(
                            domain_id,
                            OwnershipRow {
                                org_id,
                                since,
                                version,
                            },
                        );
                    }
                    Write::Transfer(record) => state.transfers.push(record),
                    Write::Content(item) => {
                        state
                            .content
                            .insert(item.id.clone(), ContentRow { item, version });
                    }
                }
            }
            debug!(version, "Transaction committed");
        }
        self.release();
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        self.writes.clear();
        self.release();
        Ok(())
    }
}
