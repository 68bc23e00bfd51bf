//! PostgreSQL backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cms_tenant::{DomainId, DomainOwnership, OrgId, OwnershipTransfer};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;

use super::{IsolationLevel, StoreError, StoreResult, StoreTransaction, TenancyStore};
use crate::content::{ContentItem, ContentQuery, ContentStatus};

const SCHEMA: &str = include_str!("../../migrations/0001_tenancy.sql");

const CONTENT_COLUMNS: &str = "c.id, c.domain_id, c.title, c.body, c.content_type, c.status, \
     c.publish_at, c.published_at, c.archived_at, c.created_at, c.updated_at";

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: Duration::from_secs(30),
        }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Applied with `SET LOCAL` at the start of every transaction.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if missing.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl TenancyStore for PgStore {
    type Tx = PgTransaction;

    #[instrument(skip(self))]
    async fn begin(&self, isolation: IsolationLevel) -> StoreResult<PgTransaction> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let set_isolation = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        sqlx::query(&set_isolation)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_statement_timeout", e))?;

        Ok(PgTransaction { tx })
    }

    async fn ownership_exists(&self, org_id: &OrgId, domain_id: &DomainId) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM domain_ownership WHERE domain_id = $1 AND org_id = $2)",
        )
        .bind(domain_id.as_str())
        .bind(org_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ownership_exists", e))?;
        row.try_get::<bool, _>(0)
            .map_err(|e| map_sqlx_error("ownership_exists", e))
    }

    async fn domain_owner(&self, domain_id: &DomainId) -> StoreResult<Option<OrgId>> {
        let row = sqlx::query("SELECT org_id FROM domain_ownership WHERE domain_id = $1")
            .bind(domain_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("domain_owner", e))?;
        row.map(|row| org_from_row(&row)).transpose()
    }

    #[instrument(skip(self, ownership), fields(domain_id = %ownership.domain_id))]
    async fn register_domain(&self, ownership: &DomainOwnership) -> StoreResult<()> {
        sqlx::query("INSERT INTO domain_ownership (domain_id, org_id, since) VALUES ($1, $2, $3)")
            .bind(ownership.domain_id.as_str())
            .bind(ownership.org_id.as_str())
            .bind(ownership.since)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("register_domain", e))?;
        Ok(())
    }
}

/// Transaction on one pooled connection. Dropped uncommitted, sqlx rolls it
/// back when the connection returns to the pool.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_ownership(&mut self, org_id: &OrgId, domain_id: &DomainId) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM domain_ownership WHERE domain_id = $1 AND org_id = $2 FOR UPDATE",
        )
        .bind(domain_id.as_str())
        .bind(org_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_ownership", e))?;
        Ok(row.is_some())
    }

    async fn lock_domain_owner(&mut self, domain_id: &DomainId) -> StoreResult<Option<OrgId>> {
        let row = sqlx::query("SELECT org_id FROM domain_ownership WHERE domain_id = $1 FOR UPDATE")
            .bind(domain_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_domain_owner", e))?;
        row.map(|row| org_from_row(&row)).transpose()
    }

    async fn reassign_owner(
        &mut self,
        domain_id: &DomainId,
        from: &OrgId,
        to: &OrgId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<u64>> {
        let result = sqlx::query(
            "UPDATE domain_ownership SET org_id = $3, since = $4 \
             WHERE domain_id = $1 AND org_id = $2",
        )
        .bind(domain_id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reassign_owner", e))?;
        Ok(Some(result.rows_affected()))
    }

    async fn record_transfer(&mut self, record: &OwnershipTransfer) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO domain_ownership_transfers \
             (id, domain_id, from_org, to_org, transferred_at, correlation_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.domain_id.as_str())
        .bind(record.from_org.as_str())
        .bind(record.to_org.as_str())
        .bind(record.transferred_at)
        .bind(record.correlation_id.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("record_transfer", e))?;
        Ok(())
    }

    async fn insert_content(&mut self, item: &ContentItem) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO content_items \
             (id, domain_id, title, body, content_type, status, publish_at, published_at, \
              archived_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&item.id)
        .bind(item.domain_id.as_str())
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.content_type)
        .bind(item.status.as_str())
        .bind(item.publish_at)
        .bind(item.published_at)
        .bind(item.archived_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_content", e))?;
        Ok(())
    }

    async fn find_content(&mut self, id: &str) -> StoreResult<Option<ContentItem>> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content_items c WHERE c.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_content", e))?;
        row.map(|row| content_from_row(&row)).transpose()
    }

    async fn find_owned_content(
        &mut self,
        id: &str,
        org_id: &OrgId,
    ) -> StoreResult<Option<ContentItem>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items c \
             JOIN domain_ownership o ON o.domain_id = c.domain_id \
             WHERE c.id = $1 AND o.org_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(org_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_owned_content", e))?;
        row.map(|row| content_from_row(&row)).transpose()
    }

    async fn save_transition(
        &mut self,
        org_id: &OrgId,
        prior: ContentStatus,
        item: &ContentItem,
    ) -> StoreResult<Option<u64>> {
        let result = sqlx::query(
            "UPDATE content_items c SET \
                 title = $4, body = $5, status = $6, publish_at = $7, published_at = $8, \
                 archived_at = $9, updated_at = $10 \
             WHERE c.id = $1 AND c.status = $2 \
               AND EXISTS (SELECT 1 FROM domain_ownership o \
                           WHERE o.domain_id = c.domain_id AND o.org_id = $3)",
        )
        .bind(&item.id)
        .bind(prior.as_str())
        .bind(org_id.as_str())
        .bind(&item.title)
        .bind(&item.body)
        .bind(item.status.as_str())
        .bind(item.publish_at)
        .bind(item.published_at)
        .bind(item.archived_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_transition", e))?;
        Ok(Some(result.rows_affected()))
    }

    async fn search_content(
        &mut self,
        org_id: &OrgId,
        query: &ContentQuery,
    ) -> StoreResult<Vec<ContentItem>> {
        // title only; body search needs a trigram index first
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items c \
             JOIN domain_ownership o ON o.domain_id = c.domain_id AND o.org_id = $1 \
             WHERE c.domain_id = $2 \
               AND ($3::text IS NULL OR c.status = $3) \
               AND ($4::text IS NULL OR c.title ILIKE '%' || $4 || '%') \
             ORDER BY c.updated_at DESC, c.id \
             LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query(&sql)
            .bind(org_id.as_str())
            .bind(query.domain_id.as_str())
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.search.as_deref().map(escape_like))
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("search_content", e))?;
        rows.iter().map(content_from_row).collect()
    }

    async fn due_scheduled(
        &mut self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<ContentItem>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items c \
             WHERE c.status = 'scheduled' AND c.publish_at <= $1 \
             ORDER BY c.publish_at, c.id \
             LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("due_scheduled", e))?;
        rows.iter().map(content_from_row).collect()
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn org_from_row(row: &PgRow) -> StoreResult<OrgId> {
    row.try_get::<String, _>("org_id")
        .map(OrgId::new)
        .map_err(|e| StoreError::Decode(e.to_string()))
}

fn content_from_row(row: &PgRow) -> StoreResult<ContentItem> {
    let decode = |e: sqlx::Error| StoreError::Decode(e.to_string());
    let status: String = row.try_get("status").map_err(decode)?;
    let status = ContentStatus::parse(&status)
        .ok_or_else(|| StoreError::Decode(format!("unknown content status '{status}'")))?;

    Ok(ContentItem {
        id: row.try_get("id").map_err(decode)?,
        domain_id: DomainId::new(row.try_get::<String, _>("domain_id").map_err(decode)?),
        title: row.try_get("title").map_err(decode)?,
        body: row.try_get("body").map_err(decode)?,
        content_type: row.try_get("content_type").map_err(decode)?,
        status,
        publish_at: row.try_get("publish_at").map_err(decode)?,
        published_at: row.try_get("published_at").map_err(decode)?,
        archived_at: row.try_get("archived_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

/// Map a sqlx error onto a [`StoreError`] by SQLSTATE.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::SerializationConflict,
                Some("57014") | Some("55P03") => StoreError::Timeout,
                Some("23505") => StoreError::Duplicate(message),
                _ => StoreError::Database(message),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(format!("{operation}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
