//! SQLite key-value backend for ChainScan.
//!
//! Every table lives in one `kv` relation keyed by `(tbl, k)`. Uses `sqlx`
//! with WAL mode so readers do not block the apply path.
//!
//! # Usage
//! ```rust,no_run
//! use chainscan_storage::sqlite::SqliteKv;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let full = SqliteKv::open("./full.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let fork = SqliteKv::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use chainscan_core::error::IndexerError;
use chainscan_core::kv::{prefix_end, KvPair, KvStore, KvTx, Table};

/// SQLite-backed [`KvStore`].
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./full.db"`) or a full
    /// SQLite URL (`"sqlite:./full.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(IndexerError::storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        debug!(path, "sqlite store opened");
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to one connection that is never recycled, since every
    /// connection to `:memory:` is a separate database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(IndexerError::storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(IndexerError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv (
                tbl TEXT NOT NULL,
                k   BLOB NOT NULL,
                v   BLOB NOT NULL,
                PRIMARY KEY (tbl, k)
            ) WITHOUT ROWID;",
        )
        .execute(&self.pool)
        .await
        .map_err(IndexerError::storage)?;

        Ok(())
    }

    /// Number of stored entries in `table`.
    pub async fn count(&self, table: Table) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM kv WHERE tbl = ?")
            .bind(table.name())
            .fetch_one(&self.pool)
            .await
            .map_err(IndexerError::storage)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn begin(&self) -> Result<Box<dyn KvTx>, IndexerError> {
        let tx = self.pool.begin().await.map_err(IndexerError::storage)?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl KvTx for SqliteTx {
    async fn get(&mut self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        let row = sqlx::query("SELECT v FROM kv WHERE tbl = ? AND k = ?")
            .bind(table.name())
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(IndexerError::storage)?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("v")))
    }

    async fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), IndexerError> {
        sqlx::query("INSERT OR REPLACE INTO kv (tbl, k, v) VALUES (?, ?, ?)")
            .bind(table.name())
            .bind(key)
            .bind(value)
            .execute(&mut *self.tx)
            .await
            .map_err(IndexerError::storage)?;
        Ok(())
    }

    async fn delete(&mut self, table: Table, key: &[u8]) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM kv WHERE tbl = ? AND k = ?")
            .bind(table.name())
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(IndexerError::storage)?;
        Ok(())
    }

    async fn scan_prefix(
        &mut self,
        table: Table,
        prefix: &[u8],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<KvPair>, IndexerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = match prefix_end(prefix) {
            Some(end) => {
                sqlx::query(
                    "SELECT k, v FROM kv WHERE tbl = ? AND k >= ? AND k < ?
                     ORDER BY k LIMIT ? OFFSET ?",
                )
                .bind(table.name())
                .bind(prefix)
                .bind(end)
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *self.tx)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT k, v FROM kv WHERE tbl = ? AND k >= ?
                     ORDER BY k LIMIT ? OFFSET ?",
                )
                .bind(table.name())
                .bind(prefix)
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *self.tx)
                .await
            }
        }
        .map_err(IndexerError::storage)?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<Vec<u8>, _>("k"), r.get::<Vec<u8>, _>("v")))
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let SqliteTx { tx } = *self;
        tx.commit().await.map_err(IndexerError::storage)
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        let SqliteTx { tx } = *self;
        tx.rollback().await.map_err(IndexerError::storage)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
