//! SQLite-backed sticker store with lazy, once-only initialization

use crate::error::{Result, StoreError};
use crate::types::{CachedAsset, Lookup, Payload, StoreConfig, StoreStats};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(sqlx::FromRow)]
struct StickerRow {
    id: String,
    payload: Vec<u8>,
    content_type: Option<String>,
}

impl From<StickerRow> for CachedAsset {
    fn from(row: StickerRow) -> Self {
        CachedAsset {
            id: row.id,
            payload: Payload {
                data: row.payload,
                content_type: row.content_type,
            },
        }
    }
}

/// Keyed blob store shared by every request handler.
///
/// The connection pool and schema are set up by the first operation that
/// needs them; concurrent callers wait on that single initialization.
pub struct StickerStore {
    config: StoreConfig,
    pool: OnceCell<SqlitePool>,
    closed: AtomicBool,
}

impl StickerStore {
    /// Create a store handle. No I/O happens until [`StickerStore::open`].
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Connect and apply migrations if that has not happened yet
    pub async fn open(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error());
        }
        let pool = self.pool.get_or_try_init(|| self.connect()).await?;

        // `close` may have run while the connection was being set up
        if self.closed.load(Ordering::SeqCst) {
            pool.close().await;
            return Err(closed_error());
        }
        Ok(pool)
    }

    async fn connect(&self) -> Result<SqlitePool> {
        let path = &self.config.path;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::StorageUnavailable(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        if let Err(e) = MIGRATOR.run(&pool).await {
            pool.close().await;
            return Err(e.into());
        }

        info!(path = ?path, "Sticker store opened");
        Ok(pool)
    }

    /// Insert a record in its own transaction. Never overwrites.
    pub async fn put(&self, asset: &CachedAsset) -> Result<()> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let inserted =
            sqlx::query("INSERT INTO stickers (id, payload, content_type) VALUES (?, ?, ?)")
                .bind(&asset.id)
                .bind(&asset.payload.data)
                .bind(asset.payload.content_type.as_deref())
                .execute(&mut *tx)
                .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::DuplicateKey(asset.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        debug!(id = %asset.id, size = asset.payload.data.len(), "Stored sticker");
        Ok(())
    }

    /// Look up a record by id
    pub async fn get(&self, id: &str) -> Lookup {
        match self.fetch(id).await {
            Ok(Some(asset)) => Lookup::Found(asset),
            Ok(None) => Lookup::NotFound,
            Err(e) => Lookup::Failed(e),
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<CachedAsset>> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, StickerRow>(
            "SELECT id, payload, content_type FROM stickers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(CachedAsset::from))
    }

    /// Entry count, payload bytes and applied schema version
    pub async fn stats(&self) -> Result<StoreStats> {
        let pool = self.pool().await?;

        let (entries, total_size): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(payload)), 0) FROM stickers",
        )
        .fetch_one(pool)
        .await?;

        let schema_version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(pool)
        .await?;

        Ok(StoreStats {
            entries: entries.max(0) as u64,
            total_size: total_size.max(0) as u64,
            schema_version,
        })
    }

    /// Close the pool. Later operations fail with `StorageUnavailable`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("Sticker store closed twice");
            return;
        }
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("Sticker store closed");
        }
    }
}

fn closed_error() -> StoreError {
    StoreError::StorageUnavailable("store has been closed".to_string())
}
