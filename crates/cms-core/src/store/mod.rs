//! Storage seam for ownership and content.
//!
//! A [`TenancyStore`] opens [`StoreTransaction`]s at an explicit
//! [`IsolationLevel`]. Transactions are consumed by `commit` or `rollback`;
//! dropping one that was never finished rolls it back, so a rollback can never
//! be issued twice.
//!
//! Two backends are provided:
//! - [`MemoryStore`] (feature `memory`, default): row locks, snapshot conflicts
//!   and buffered writes emulated in process
//! - `PgStore` (feature `postgres`): PostgreSQL through `sqlx`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cms_tenant::{DomainId, DomainOwnership, OrgId, OwnershipTransfer};
use thiserror::Error;

use crate::content::{ContentItem, ContentQuery, ContentStatus};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "memory")]
pub use memory::{MemoryStore, MemoryTransaction};
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, PgTransaction};

/// Transaction isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether reads inside the transaction are pinned to a snapshot.
    pub fn uses_snapshot(&self) -> bool {
        !matches!(self, Self::ReadCommitted)
    }
}

/// Storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent update under repeatable read or serializable isolation
    #[error("serialization conflict")]
    SerializationConflict,

    /// Statement or lock wait exceeded its timeout
    #[error("statement timed out")]
    Timeout,

    /// Unique constraint violation
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be mapped back to a value
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_serialization_conflict(&self) -> bool {
        matches!(self, Self::SerializationConflict)
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SerializationConflict => "SERIALIZATION_CONFLICT",
            Self::Timeout => "STORE_TIMEOUT",
            Self::Duplicate(_) => "DUPLICATE_KEY",
            Self::Connection(_) => "STORE_UNAVAILABLE",
            Self::Database(_) => "STORE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point of a storage backend.
#[async_trait]
pub trait TenancyStore: Send + Sync + 'static {
    type Tx: StoreTransaction + 'static;

    /// Open a transaction.
    async fn begin(&self, isolation: IsolationLevel) -> StoreResult<Self::Tx>;

    /// Non-locking check that `org_id` currently owns `domain_id`.
    async fn ownership_exists(&self, org_id: &OrgId, domain_id: &DomainId) -> StoreResult<bool>;

    /// Current owner of a domain, if registered.
    async fn domain_owner(&self, domain_id: &DomainId) -> StoreResult<Option<OrgId>>;

    /// Insert the initial ownership fact. `Duplicate` if the domain is owned.
    async fn register_domain(&self, ownership: &DomainOwnership) -> StoreResult<()>;
}

/// An open transaction.
#[async_trait]
pub trait StoreTransaction: Send + Sized {
    /// `SELECT ... FOR UPDATE` on the `(domain, org)` ownership row.
    /// Returns whether it exists.
    async fn lock_ownership(&mut self, org_id: &OrgId, domain_id: &DomainId) -> StoreResult<bool>;

    /// Lock the domain's ownership row and return its owner.
    async fn lock_domain_owner(&mut self, domain_id: &DomainId) -> StoreResult<Option<OrgId>>;

    /// Move the ownership row from `from` to `to`. Returns affected rows when
    /// the backend reports them.
    async fn reassign_owner(
        &mut self,
        domain_id: &DomainId,
        from: &OrgId,
        to: &OrgId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<u64>>;

    /// Append a transfer audit record.
    async fn record_transfer(&mut self, record: &OwnershipTransfer) -> StoreResult<()>;

    /// Insert a new item. `Duplicate` if the id is taken.
    async fn insert_content(&mut self, item: &ContentItem) -> StoreResult<()>;

    async fn find_content(&mut self, id: &str) -> StoreResult<Option<ContentItem>>;

    /// Find an item only if its domain is owned by `org_id`.
    async fn find_owned_content(
        &mut self,
        id: &str,
        org_id: &OrgId,
    ) -> StoreResult<Option<ContentItem>>;

    /// Conditional write of a transition: matches only while the row is still
    /// in `prior` status and its domain is owned by `org_id` at write time.
    async fn save_transition(
        &mut self,
        org_id: &OrgId,
        prior: ContentStatus,
        item: &ContentItem,
    ) -> StoreResult<Option<u64>>;

    /// Items of a domain owned by `org_id` matching `query`, newest update first.
    async fn search_content(
        &mut self,
        org_id: &OrgId,
        query: &ContentQuery,
    ) -> StoreResult<Vec<ContentItem>>;

    /// Scheduled items whose publish time is at or before `now`, oldest first.
    async fn due_scheduled(&mut self, now: DateTime<Utc>, limit: u32)
        -> StoreResult<Vec<ContentItem>>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Treat an unknown affected-row count like zero.
pub fn rows_applied(affected: Option<u64>) -> bool {
    matches!(affected, Some(n) if n > 0)
}
