//! Per-channel `SQLite` files.
//!
//! Every channel keeps its artifact state in `{db_path}/{channel}.sqlite`.
//! Files are opened in WAL mode with full synchronous commits, so a write
//! acknowledged by the store survives a crash, and the schema in
//! `./migrations` is applied on open.
//!
//! # Example
//!
//! ```no_run
//! use stockpile_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open_channel(Path::new("db"), "npm").await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size. The walker writes through one connection at a time; the rest
/// serve the download phase's snapshot and counts.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening a channel database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The directory that should hold the database file could not be created.
    #[error("database directory {path} is not usable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open database: {0}")]
    Connection(#[from] sqlx::Error),

    /// The schema could not be brought up to date.
    #[error("cannot apply schema: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// A migrated connection pool for one channel's store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the file cannot be opened and
    /// [`DbError::Migration`] if the schema cannot be applied.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn new(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// Opens `{db_dir}/{channel_id}.sqlite`, creating `db_dir` first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Directory`] if the directory cannot be created,
    /// otherwise the same errors as [`Database::new`].
    pub async fn open_channel(db_dir: &Path, channel_id: &str) -> Result<Self, DbError> {
        tokio::fs::create_dir_all(db_dir)
            .await
            .map_err(|source| DbError::Directory {
                path: db_dir.to_path_buf(),
                source,
            })?;
        Self::new(&db_dir.join(format!("{channel_id}.sqlite"))).await
    }

    /// Opens a private in-memory database; used by tests.
    ///
    /// # Errors
    ///
    /// Same as [`Database::new`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        // One connection: every new in-memory connection would be a new database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("schema up to date");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current journal mode as reported by `SQLite`, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma query fails.
    pub async fn journal_mode(&self) -> Result<String, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_ascii_lowercase())
    }

    /// Waits for open connections to finish and closes the pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
