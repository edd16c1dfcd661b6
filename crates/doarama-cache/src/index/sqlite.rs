//! SQLite-backed index.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE activities (
//!     gpstrack_sha256     BLOB    NOT NULL CHECK (length(gpstrack_sha256) = 32),
//!     activityinfo_sha256 BLOB    NOT NULL CHECK (length(activityinfo_sha256) = 32),
//!     activity_id         INTEGER NOT NULL,
//!     PRIMARY KEY (gpstrack_sha256, activityinfo_sha256)
//! ) WITHOUT ROWID;
//!
//! CREATE TABLE index_meta (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL);
//! ```
//!
//! The composite primary key is the only uniqueness constraint. Earlier
//! databases declared each column `UNIQUE` on its own, which rejects a second
//! track uploaded with the same metadata. Such databases are refused at open
//! time rather than migrated: their rows carry no information about which
//! canonicalization produced the info digests.
//!
//! `index_meta` records the [`FINGERPRINT_SCHEME`] in force when the index
//! was created. Opening it under a different scheme fails.
//!
//! The database runs in WAL mode with a busy timeout, so several processes
//! may share one file, and may open it for the first time together. Concurrent inserts for the same fingerprint are
//! serialized by SQLite and the loser gets [`IndexError::DuplicateKey`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use doarama_core::{ActivityId, Fingerprint, InfoDigest, TrackDigest, FINGERPRINT_SCHEME};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::time::Instant;

use super::{ActivityIndex, IndexEntry};
use crate::config::CacheConfig;
use crate::error::IndexError;

const SCHEME_KEY: &str = "fingerprint_scheme";

const OPEN_RETRY_MIN: Duration = Duration::from_millis(10);
const OPEN_RETRY_MAX: Duration = Duration::from_millis(250);

/// File-backed [`ActivityIndex`].
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteIndex {
    /// Open (creating if missing) the index at `path` with default settings.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let config = CacheConfig {
            database_path: path.as_ref().to_path_buf(),
            ..CacheConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open (creating if missing) the index described by `config`.
    ///
    /// Several processes may open a fresh file at once. Schema setup takes
    /// the write lock up front, and an open that still meets a busy database
    /// is retried until `config.busy_timeout` has elapsed.
    pub async fn open_with(config: &CacheConfig) -> Result<Self, IndexError> {
        let path = config.database_path.clone();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let deadline = Instant::now() + config.busy_timeout;
        let mut backoff = OPEN_RETRY_MIN;
        loop {
            match Self::try_open(config, &path).await {
                Err(e) if e.is_busy() && Instant::now() < deadline => {
                    tracing::debug!(path = %path.display(), error = %e, "index busy during open, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(OPEN_RETRY_MAX);
                }
                result => return result,
            }
        }
    }

    async fn try_open(config: &CacheConfig, path: &Path) -> Result<Self, IndexError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Another process may hold the write lock; wait instead of failing.
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.busy_timeout.max(Duration::from_secs(1)))
            .connect_with(opts)
            .await?;

        let index = Self {
            pool,
            path: path.to_path_buf(),
        };
        if let Err(e) = index.migrate().await {
            index.pool.close().await;
            return Err(e);
        }

        tracing::debug!(path = %index.path.display(), "opened activity index");
        Ok(index)
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The fingerprint scheme recorded in the database.
    pub async fn scheme(&self) -> Result<Option<String>, IndexError> {
        let scheme = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(SCHEME_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(scheme)
    }

    /// Create or check the schema under `BEGIN IMMEDIATE`.
    ///
    /// A deferred transaction would read the schema first and then fail
    /// with SQLITE_BUSY, without waiting, on upgrading to a writer.
    async fn migrate(&self) -> Result<(), IndexError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match self.migrate_locked(&mut conn).await {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(error = %rollback, "failed to roll back schema setup");
                }
                Err(e)
            }
        }
    }

    async fn migrate_locked(&self, conn: &mut SqliteConnection) -> Result<(), IndexError> {
        let table_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'activities')",
        )
        .fetch_one(&mut *conn)
        .await?;

        if table_exists {
            // (cid, name, type, notnull, dflt_value, pk)
            let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
                sqlx::query_as("PRAGMA table_info(activities)")
                    .fetch_all(&mut *conn)
                    .await?;
            let in_key = |name: &str| columns.iter().any(|c| c.1 == name && c.5 > 0);
            let key_width = columns.iter().filter(|c| c.5 > 0).count();
            if !(in_key("gpstrack_sha256") && in_key("activityinfo_sha256") && key_width == 2) {
                tracing::warn!(
                    path = %self.path.display(),
                    "activities table lacks the composite (gpstrack_sha256, activityinfo_sha256) key"
                );
                return Err(IndexError::IncompatibleSchema(format!(
                    "{}: activities table is not keyed on (gpstrack_sha256, activityinfo_sha256); \
                     move the file aside to start a fresh index",
                    self.path.display()
                )));
            }
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activities (
                gpstrack_sha256     BLOB    NOT NULL CHECK (length(gpstrack_sha256) = 32),
                activityinfo_sha256 BLOB    NOT NULL CHECK (length(activityinfo_sha256) = 32),
                activity_id         INTEGER NOT NULL,
                PRIMARY KEY (gpstrack_sha256, activityinfo_sha256)
            ) WITHOUT ROWID",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activities_activity_id ON activities (activity_id)",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
            .bind(SCHEME_KEY)
            .bind(FINGERPRINT_SCHEME)
            .execute(&mut *conn)
            .await?;

        let found: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(SCHEME_KEY)
            .fetch_one(&mut *conn)
            .await?;
        if found != FINGERPRINT_SCHEME {
            return Err(IndexError::SchemeMismatch {
                expected: FINGERPRINT_SCHEME.to_string(),
                found,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ActivityIndex for SqliteIndex {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ActivityId>, IndexError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT activity_id FROM activities
             WHERE gpstrack_sha256 = ? AND activityinfo_sha256 = ?",
        )
        .bind(fingerprint.track.as_bytes().as_slice())
        .bind(fingerprint.info.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(ActivityId::new))
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        activity_id: ActivityId,
    ) -> Result<(), IndexError> {
        let result = sqlx::query(
            "INSERT INTO activities (gpstrack_sha256, activityinfo_sha256, activity_id)
             VALUES (?, ?, ?)",
        )
        .bind(fingerprint.track.as_bytes().as_slice())
        .bind(fingerprint.info.as_bytes().as_slice())
        .bind(activity_id.get())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(IndexError::DuplicateKey {
                    fingerprint: *fingerprint,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError> {
        let result = sqlx::query(
            "DELETE FROM activities WHERE gpstrack_sha256 = ? AND activityinfo_sha256 = ?",
        )
        .bind(fingerprint.track.as_bytes().as_slice())
        .bind(fingerprint.info.as_bytes().as_slice())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_activity(&self, activity_id: ActivityId) -> Result<u64, IndexError> {
        let result = sqlx::query("DELETE FROM activities WHERE activity_id = ?")
            .bind(activity_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT gpstrack_sha256, activityinfo_sha256, activity_id
             FROM activities ORDER BY activity_id, gpstrack_sha256, activityinfo_sha256",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRow::into_entry).collect()
    }

    async fn count(&self) -> Result<u64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!(path = %self.path.display(), "closed activity index");
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ActivityRow {
    gpstrack_sha256: Vec<u8>,
    activityinfo_sha256: Vec<u8>,
    activity_id: i64,
}

impl ActivityRow {
    fn into_entry(self) -> Result<IndexEntry, IndexError> {
        let track = TrackDigest::from_slice(&self.gpstrack_sha256)
            .map_err(|e| IndexError::Corrupt(format!("gpstrack_sha256: {e}")))?;
        let info = InfoDigest::from_slice(&self.activityinfo_sha256)
            .map_err(|e| IndexError::Corrupt(format!("activityinfo_sha256: {e}")))?;
        Ok(IndexEntry {
            fingerprint: Fingerprint::new(track, info),
            activity_id: ActivityId::new(self.activity_id),
        })
    }
}
