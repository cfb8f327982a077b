//! Postgres-backed stores.
//!
//! Expiry is enforced on read: every query only matches rows whose
//! `created_at` is within the TTL. A janitor task deletes the rest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collectify_core::{Entry, EntryPatch, Item, Shares, SourceDescriptor, SourceKind};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{EntryStore, SourceFeed};
use crate::error::{PipelineError, StoreError};

const ENTRY_COLUMNS: &str =
    "id, version, guid, url, title, image, content, keywords, shares, posted, created_at";

/// Open a pool and apply migrations. Failure here is fatal to startup.
#[instrument(skip_all)]
pub async fn connect_postgres(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, PipelineError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    info!("PostgreSQL connected");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ── Entries ──────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: i64,
    version: i32,
    guid: String,
    url: String,
    title: String,
    image: Option<String>,
    content: Option<String>,
    keywords: Option<Vec<String>>,
    shares: Option<Json<Shares>>,
    posted: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            id: row.id,
            version: row.version,
            guid: row.guid,
            url: row.url,
            title: row.title,
            image: row.image,
            content: row.content,
            keywords: row.keywords,
            shares: row.shares.map(|Json(s)| s),
            posted: row.posted,
            created_at: row.created_at,
        }
    }
}

pub struct PgEntryStore {
    pool: PgPool,
    ttl_secs: f64,
}

impl PgEntryStore {
    pub fn new(pool: PgPool, ttl: chrono::Duration) -> Self {
        Self {
            pool,
            ttl_secs: ttl.num_seconds() as f64,
        }
    }

    /// Delete every expired row; returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM entries WHERE created_at <= now() - make_interval(secs => $1)",
        )
        .bind(self.ttl_secs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Run [`PgEntryStore::purge_expired`] every `every`. Abort the handle
    /// to stop it.
    pub fn spawn_janitor(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => debug!(purged = n, "expired entries removed"),
                    Err(e) => warn!(error = %e, "entry purge failed"),
                }
            }
        })
    }
}

#[async_trait]
impl EntryStore for PgEntryStore {
    async fn count(&self, guid: &str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM entries
             WHERE guid = $1 AND created_at > now() - make_interval(secs => $2)",
        )
        .bind(guid)
        .bind(self.ttl_secs)
        .fetch_one(&self.pool)
        .await?;
        Ok(n.max(0) as u64)
    }

    async fn create(&self, item: &Item) -> Result<Entry, StoreError> {
        // An expired row with the same guid is overwritten in place; a live
        // one makes the WHERE fail and nothing is returned.
        let sql = format!(
            "INSERT INTO entries (guid, url, title, image, content, keywords, shares, posted, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, now()))
             ON CONFLICT (guid) DO UPDATE SET
                url = EXCLUDED.url,
                title = EXCLUDED.title,
                image = EXCLUDED.image,
                content = EXCLUDED.content,
                keywords = EXCLUDED.keywords,
                shares = EXCLUDED.shares,
                posted = EXCLUDED.posted,
                created_at = EXCLUDED.created_at,
                version = 0
             WHERE entries.created_at <= now() - make_interval(secs => $10)
             RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(&item.guid)
            .bind(&item.url)
            .bind(&item.title)
            .bind(&item.image)
            .bind(&item.content)
            .bind(&item.keywords)
            .bind(item.shares.clone().map(Json))
            .bind(item.posted)
            .bind(item.created_at)
            .bind(self.ttl_secs)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, &item.guid))?;

        row.map(Entry::from)
            .ok_or_else(|| StoreError::Duplicate(item.guid.clone()))
    }

    async fn update(&self, patch: &EntryPatch) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE entries SET
                created_at = COALESCE($2, created_at),
                title = COALESCE($3, title),
                image = COALESCE($4, image),
                content = COALESCE($5, content),
                keywords = COALESCE($6, keywords),
                shares = COALESCE($7, shares),
                version = version + 1
             WHERE guid = $1 AND created_at > now() - make_interval(secs => $8)",
        )
        .bind(&patch.guid)
        .bind(patch.created_at)
        .bind(&patch.title)
        .bind(&patch.image)
        .bind(&patch.content)
        .bind(&patch.keywords)
        .bind(patch.shares.clone().map(Json))
        .bind(self.ttl_secs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_one(&self, guid: &str) -> Result<Option<Entry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE guid = $1 AND created_at > now() - make_interval(secs => $2)"
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(guid)
            .bind(self.ttl_secs)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Entry::from))
    }
}

// ── Sources ──────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    active: bool,
    kind: String,
    name: String,
    url: String,
    listref: Option<String>,
    format: Option<String>,
    template: serde_json::Value,
}

impl TryFrom<SourceRow> for SourceDescriptor {
    type Error = StoreError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        let kind: SourceKind = row
            .kind
            .parse()
            .map_err(|e: collectify_core::CoreError| StoreError::Decode(e.to_string()))?;
        Ok(SourceDescriptor {
            active: row.active,
            kind,
            name: row.name,
            url: row.url,
            listref: row.listref,
            format: row.format,
            template: row.template,
        })
    }
}

pub struct PgSourceFeed {
    pool: PgPool,
}

impl PgSourceFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceFeed for PgSourceFeed {
    async fn find_active(&self) -> Result<Vec<SourceDescriptor>, StoreError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT active, kind, name, url, listref, format, template
             FROM sources
             WHERE active
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sources = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row.name.clone();
            match SourceDescriptor::try_from(row) {
                Ok(source) => sources.push(source),
                Err(e) => warn!(source = %name, error = %e, "skipping unreadable source row"),
            }
        }
        Ok(sources)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Map a PostgreSQL unique violation (23505) to `Duplicate`.
fn map_unique_violation(e: sqlx::Error, guid: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(guid.to_string());
        }
    }
    StoreError::from(e)
}
