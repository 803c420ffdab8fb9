//! Store engine: connection, schema, settings, and retry policy
//!
//! The `Store` is the sole persistence boundary. It owns a SQLite pool and
//! is injected into the indexer, vetter, and deletion engine; nothing in
//! this crate holds a global database handle.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::utils::dates::unix_now;

/// Key under which the schema version lives in `settings`
pub const SCHEMA_VERSION_KEY: &str = "schema_version";
/// Key guarding against concurrent deletion plans
pub const ACTIVE_SESSION_KEY: &str = "active_session";

/// Current schema version
pub const SCHEMA_VERSION: i64 = 2;

/// Transient busy/locked failures are retried this many times
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Persistent index over the owner's audio collection
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the index database at `path`.
    ///
    /// Fails with an integrity error when the file exists but does not pass
    /// `PRAGMA integrity_check`, or when its schema is newer than this
    /// binary understands.
    pub async fn open(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}", path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(Error::Store)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("cache_size", "10000")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Self::init(pool).await
    }

    /// In-memory store for tests. A single connection keeps every reader on
    /// the same database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(Error::Store)?
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        let store = Store { pool };
        store.check_integrity().await?;
        store.create_tables().await?;
        store.run_migrations().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn check_integrity(&self) -> Result<()> {
        let verdict: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;
        if verdict != "ok" {
            return Err(Error::integrity(format!(
                "database failed integrity check: {verdict}"
            )));
        }
        Ok(())
    }

    /// Run `op` with exponential backoff on SQLITE_BUSY / SQLITE_LOCKED.
    pub(crate) async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut delay = Duration::from_millis(50);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!("store busy (attempt {attempt}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(Error::Store(e)),
            }
        }
    }

    // ========== Schema ==========

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS library_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                artist TEXT,
                title TEXT,
                album TEXT,
                year INTEGER,
                duration REAL NOT NULL DEFAULT 0,
                format TEXT NOT NULL,
                size INTEGER NOT NULL,
                metadata_hash TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                quality_score INTEGER NOT NULL DEFAULT 0,
                bitrate INTEGER,
                sample_rate INTEGER,
                bit_depth INTEGER,
                channels INTEGER NOT NULL DEFAULT 2,
                bitrate_mode TEXT NOT NULL DEFAULT 'UNKNOWN',
                is_lossless INTEGER NOT NULL DEFAULT 0,
                is_hires INTEGER NOT NULL DEFAULT 0,
                artist_id INTEGER REFERENCES artists(id),
                album_id INTEGER REFERENCES albums(id),
                indexed_at INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL,
                last_verified INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_files_metadata_hash ON library_files(metadata_hash);
            CREATE INDEX IF NOT EXISTS idx_files_content_hash ON library_files(content_hash);
            CREATE INDEX IF NOT EXISTS idx_files_artist_title ON library_files(lower(artist), lower(title));
            CREATE INDEX IF NOT EXISTS idx_files_active ON library_files(is_active);
            CREATE INDEX IF NOT EXISTS idx_files_format ON library_files(format);
            CREATE INDEX IF NOT EXISTS idx_files_quality ON library_files(quality_score DESC);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS albums (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                artist_id INTEGER REFERENCES artists(id),
                UNIQUE(name, artist_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS library_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                total_files INTEGER NOT NULL,
                total_bytes INTEGER NOT NULL,
                format_counts TEXT NOT NULL DEFAULT '{}',
                unique_artists INTEGER NOT NULL,
                unique_albums INTEGER NOT NULL,
                scanned_at INTEGER NOT NULL,
                scan_duration REAL NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vetting_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                import_path TEXT NOT NULL,
                total_files INTEGER NOT NULL,
                duplicates INTEGER NOT NULL,
                new_files INTEGER NOT NULL,
                uncertain INTEGER NOT NULL,
                threshold REAL NOT NULL,
                completed_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dedup_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                filename TEXT NOT NULL,
                size INTEGER NOT NULL,
                format TEXT NOT NULL,
                artist TEXT,
                title TEXT,
                album TEXT,
                year INTEGER,
                duration REAL NOT NULL DEFAULT 0,
                bitrate INTEGER,
                sample_rate INTEGER,
                quality_score INTEGER NOT NULL DEFAULT 0,
                metadata_hash TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                deletion_reason TEXT NOT NULL,
                kept_file_path TEXT NOT NULL,
                kept_file_id INTEGER,
                confidence_score REAL NOT NULL DEFAULT 1.0,
                matched_by TEXT NOT NULL,
                original_library_id INTEGER,
                can_recover INTEGER NOT NULL DEFAULT 0,
                recovery_path TEXT,
                deleted_by TEXT NOT NULL DEFAULT 'user',
                notes TEXT,
                deleted_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dedup_session ON dedup_events(session_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upgrade_candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                library_file_id INTEGER NOT NULL UNIQUE REFERENCES library_files(id),
                current_format TEXT NOT NULL,
                current_bitrate INTEGER,
                current_quality_score INTEGER NOT NULL,
                recommended_format TEXT NOT NULL,
                potential_quality_gain INTEGER NOT NULL,
                priority_score INTEGER NOT NULL,
                user_action TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_upgrades_priority ON upgrade_candidates(priority_score DESC);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========== Migrations ==========

    async fn run_migrations(&self) -> Result<()> {
        let current = self.schema_version().await?;

        if current > SCHEMA_VERSION {
            return Err(Error::integrity(format!(
                "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        if current == SCHEMA_VERSION {
            return Ok(());
        }

        tracing::info!("migrating schema from version {current} to {SCHEMA_VERSION}");

        // one transaction per version, forward only
        for version in (current + 1)..=SCHEMA_VERSION {
            let mut tx = self.pool.begin().await?;
            apply_migration(&mut tx, version).await?;
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(SCHEMA_VERSION_KEY)
            .bind(version.to_string())
            .bind(unix_now())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!("applied migration {version}");
        }

        Ok(())
    }

    /// Schema version currently recorded in `settings`; 0 when absent.
    pub async fn schema_version(&self) -> Result<i64> {
        Ok(self
            .get_setting(SCHEMA_VERSION_KEY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    // ========== Settings ==========

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(unix_now())
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletion session currently executing, if any
    pub async fn active_session(&self) -> Result<Option<String>> {
        self.get_setting(ACTIVE_SESSION_KEY).await
    }

    pub async fn set_active_session(&self, session_id: &str) -> Result<()> {
        self.set_setting(ACTIVE_SESSION_KEY, session_id).await
    }

    pub async fn clear_active_session(&self) -> Result<()> {
        self.delete_setting(ACTIVE_SESSION_KEY).await
    }
}

async fn apply_migration(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    version: i64,
) -> Result<()> {
    match version {
        1 => {
            // base schema; tables are created on open
        }
        2 => {
            // notes column on dedup_events arrived after the first release
            let has_column: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM pragma_table_info('dedup_events') WHERE name = 'notes'",
            )
            .fetch_one(&mut **tx)
            .await
            .unwrap_or(1);

            if has_column == 0 {
                sqlx::query("ALTER TABLE dedup_events ADD COLUMN notes TEXT")
                    .execute(&mut **tx)
                    .await?;
            }
        }
        _ => {
            tracing::warn!("unknown migration version: {version}");
        }
    }
    Ok(())
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("5") | Some("6") | Some("261") | Some("517")
        ),
        _ => false,
    }
}
