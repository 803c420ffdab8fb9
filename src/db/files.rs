//! Library file operations: upsert, lookups, activation, statistics

use std::collections::HashMap;

use sqlx::FromRow;

use crate::error::Result;
use crate::models::{BitrateMode, LibraryFile, LibraryStatistics, UpsertOutcome};
use crate::utils::dates::unix_now;

use super::store::Store;

/// Database row for `library_files`
#[derive(Debug, FromRow)]
struct LibraryFileRow {
    id: i64,
    path: String,
    filename: String,
    artist: Option<String>,
    title: Option<String>,
    album: Option<String>,
    year: Option<i64>,
    duration: f64,
    format: String,
    size: i64,
    metadata_hash: String,
    content_hash: String,
    quality_score: i64,
    bitrate: Option<i64>,
    sample_rate: Option<i64>,
    bit_depth: Option<i64>,
    channels: i64,
    bitrate_mode: String,
    is_lossless: bool,
    is_hires: bool,
    indexed_at: i64,
    file_mtime: i64,
    last_verified: Option<i64>,
    is_active: bool,
}

impl LibraryFileRow {
    fn into_model(self) -> LibraryFile {
        LibraryFile {
            id: self.id,
            path: self.path,
            filename: self.filename,
            artist: self.artist,
            title: self.title,
            album: self.album,
            year: self.year.map(|y| y as i32),
            duration_secs: self.duration,
            format: self.format,
            size: self.size,
            metadata_hash: self.metadata_hash,
            content_hash: self.content_hash,
            quality_score: self.quality_score.clamp(0, 100) as u8,
            bitrate_kbps: self.bitrate.map(|b| b as u32),
            sample_rate_hz: self.sample_rate.map(|s| s as u32),
            bit_depth: self.bit_depth.map(|b| b as u8),
            channels: self.channels as u8,
            bitrate_mode: BitrateMode::from_str(&self.bitrate_mode),
            is_lossless: self.is_lossless,
            is_hires: self.is_hires,
            indexed_at: self.indexed_at,
            file_mtime: self.file_mtime,
            last_verified: self.last_verified,
            is_active: self.is_active,
        }
    }
}

impl Store {
    /// Insert or update one file record, keyed on path.
    ///
    /// Returns `Unchanged` when mtime and size match the stored row (an
    /// inactive unchanged row is reactivated in place). The artist and
    /// album dimensions are deduplicated lazily inside the same
    /// transaction.
    pub async fn upsert_file(&self, file: &LibraryFile) -> Result<UpsertOutcome> {
        self.with_retry(|| self.try_upsert(file)).await
    }

    async fn try_upsert(
        &self,
        file: &LibraryFile,
    ) -> std::result::Result<UpsertOutcome, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let existing: Option<(i64, i64, i64, bool)> = sqlx::query_as(
            "SELECT id, file_mtime, size, is_active FROM library_files WHERE path = ?",
        )
        .bind(&file.path)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some((id, mtime, size, active))
                if mtime == file.file_mtime && size == file.size =>
            {
                if active {
                    sqlx::query("UPDATE library_files SET last_verified = ? WHERE id = ?")
                        .bind(unix_now())
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                } else {
                    // the file reappeared unchanged
                    sqlx::query(
                        "UPDATE library_files SET is_active = 1, last_verified = ? WHERE id = ?",
                    )
                    .bind(unix_now())
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                }
                UpsertOutcome::Unchanged
            }
            Some((id, _, _, _)) => {
                let artist_id = ensure_artist(&mut tx, file.artist.as_deref()).await?;
                let album_id =
                    ensure_album(&mut tx, file.album.as_deref(), artist_id).await?;

                sqlx::query(
                    r#"
                    UPDATE library_files SET
                        filename = ?, artist = ?, title = ?, album = ?, year = ?,
                        duration = ?, format = ?, size = ?, metadata_hash = ?,
                        content_hash = ?, quality_score = ?, bitrate = ?,
                        sample_rate = ?, bit_depth = ?, channels = ?,
                        bitrate_mode = ?, is_lossless = ?, is_hires = ?,
                        artist_id = ?, album_id = ?, indexed_at = ?,
                        file_mtime = ?, last_verified = ?, is_active = 1
                    WHERE id = ?
                    "#,
                )
                .bind(&file.filename)
                .bind(&file.artist)
                .bind(&file.title)
                .bind(&file.album)
                .bind(file.year)
                .bind(file.duration_secs)
                .bind(&file.format)
                .bind(file.size)
                .bind(&file.metadata_hash)
                .bind(&file.content_hash)
                .bind(file.quality_score as i64)
                .bind(file.bitrate_kbps.map(|b| b as i64))
                .bind(file.sample_rate_hz.map(|s| s as i64))
                .bind(file.bit_depth.map(|b| b as i64))
                .bind(file.channels as i64)
                .bind(file.bitrate_mode.as_str())
                .bind(file.is_lossless)
                .bind(file.is_hires)
                .bind(artist_id)
                .bind(album_id)
                .bind(file.indexed_at)
                .bind(file.file_mtime)
                .bind(unix_now())
                .bind(id)
                .execute(&mut *tx)
                .await?;

                UpsertOutcome::Updated
            }
            None => {
                let artist_id = ensure_artist(&mut tx, file.artist.as_deref()).await?;
                let album_id =
                    ensure_album(&mut tx, file.album.as_deref(), artist_id).await?;

                sqlx::query(
                    r#"
                    INSERT INTO library_files (
                        path, filename, artist, title, album, year, duration,
                        format, size, metadata_hash, content_hash, quality_score,
                        bitrate, sample_rate, bit_depth, channels, bitrate_mode,
                        is_lossless, is_hires, artist_id, album_id, indexed_at,
                        file_mtime, last_verified, is_active
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
                    "#,
                )
                .bind(&file.path)
                .bind(&file.filename)
                .bind(&file.artist)
                .bind(&file.title)
                .bind(&file.album)
                .bind(file.year)
                .bind(file.duration_secs)
                .bind(&file.format)
                .bind(file.size)
                .bind(&file.metadata_hash)
                .bind(&file.content_hash)
                .bind(file.quality_score as i64)
                .bind(file.bitrate_kbps.map(|b| b as i64))
                .bind(file.sample_rate_hz.map(|s| s as i64))
                .bind(file.bit_depth.map(|b| b as i64))
                .bind(file.channels as i64)
                .bind(file.bitrate_mode.as_str())
                .bind(file.is_lossless)
                .bind(file.is_hires)
                .bind(artist_id)
                .bind(album_id)
                .bind(file.indexed_at)
                .bind(file.file_mtime)
                .bind(file.last_verified)
                .execute(&mut *tx)
                .await?;

                UpsertOutcome::Added
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    // ========== Lookups ==========

    /// Active files sharing a metadata hash
    pub async fn lookup_by_metadata_hash(&self, hash: &str) -> Result<Vec<LibraryFile>> {
        let rows: Vec<LibraryFileRow> = sqlx::query_as(
            "SELECT * FROM library_files WHERE metadata_hash = ? AND is_active = 1",
        )
        .bind(hash)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    /// Active files sharing a content hash
    pub async fn lookup_by_content_hash(&self, hash: &str) -> Result<Vec<LibraryFile>> {
        let rows: Vec<LibraryFileRow> = sqlx::query_as(
            "SELECT * FROM library_files WHERE content_hash = ? AND is_active = 1",
        )
        .bind(hash)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    /// Active files by lowercased artist name; used by the fuzzy tier
    pub async fn find_by_artist(&self, artist_lower: &str) -> Result<Vec<LibraryFile>> {
        let rows: Vec<LibraryFileRow> = sqlx::query_as(
            "SELECT * FROM library_files WHERE lower(artist) = ? AND is_active = 1",
        )
        .bind(artist_lower)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<LibraryFile>> {
        let row: Option<LibraryFileRow> =
            sqlx::query_as("SELECT * FROM library_files WHERE path = ?")
                .bind(path)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|r| r.into_model()))
    }

    /// Active lossy files, for the upgrade scout
    pub async fn list_active_lossy(&self) -> Result<Vec<LibraryFile>> {
        let rows: Vec<LibraryFileRow> = sqlx::query_as(
            "SELECT * FROM library_files WHERE is_active = 1 AND is_lossless = 0",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    pub async fn count_active(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM library_files WHERE is_active = 1")
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    // ========== Activation ==========

    pub async fn deactivate(&self, path: &str) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query("UPDATE library_files SET is_active = 0 WHERE path = ?")
                .bind(path)
                .execute(self.pool())
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn reactivate(&self, path: &str) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query("UPDATE library_files SET is_active = 1, last_verified = ? WHERE path = ?")
                .bind(unix_now())
                .bind(path)
                .execute(self.pool())
                .await
                .map(|_| ())
        })
        .await
    }

    // ========== Scan support ==========

    /// path → (file_mtime, size, is_active) for every row under `root`.
    ///
    /// One read instead of a query per scanned file; the scan loop uses it
    /// for the incremental skip check.
    pub async fn known_files_under(
        &self,
        root: &str,
    ) -> Result<HashMap<String, (i64, i64, bool)>> {
        let pattern = format!("{}/%", root.trim_end_matches('/'));
        let rows: Vec<(String, i64, i64, bool)> = sqlx::query_as(
            "SELECT path, file_mtime, size, is_active FROM library_files WHERE path LIKE ?",
        )
        .bind(&pattern)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(path, mtime, size, active)| (path, (mtime, size, active)))
            .collect())
    }

    /// Active paths under `root`, for the missing-file sweep
    pub async fn list_active_paths_under(&self, root: &str) -> Result<Vec<String>> {
        let pattern = format!("{}/%", root.trim_end_matches('/'));
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT path FROM library_files WHERE is_active = 1 AND path LIKE ?",
        )
        .bind(&pattern)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    // ========== Statistics ==========

    /// Compute a fresh snapshot of the active library, append it to
    /// `library_stats`, and return it.
    pub async fn record_statistics(
        &self,
        scan_duration_secs: f64,
        scanned_at: i64,
    ) -> Result<LibraryStatistics> {
        let (total_files, total_bytes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM library_files WHERE is_active = 1",
        )
        .fetch_one(self.pool())
        .await?;

        let format_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT format, COUNT(*) FROM library_files WHERE is_active = 1 GROUP BY format",
        )
        .fetch_all(self.pool())
        .await?;
        let format_counts: HashMap<String, i64> = format_rows.into_iter().collect();

        let unique_artists: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT artist_id) FROM library_files
             WHERE is_active = 1 AND artist_id IS NOT NULL",
        )
        .fetch_one(self.pool())
        .await?;

        let unique_albums: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT album_id) FROM library_files
             WHERE is_active = 1 AND album_id IS NOT NULL",
        )
        .fetch_one(self.pool())
        .await?;

        let stats = LibraryStatistics {
            total_files,
            total_bytes,
            format_counts,
            unique_artists,
            unique_albums,
            scanned_at,
            scan_duration_secs,
        };

        let format_json = serde_json::to_string(&stats.format_counts)
            .unwrap_or_else(|_| "{}".to_string());

        self.with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO library_stats (
                    total_files, total_bytes, format_counts, unique_artists,
                    unique_albums, scanned_at, scan_duration
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(stats.total_files)
            .bind(stats.total_bytes)
            .bind(&format_json)
            .bind(stats.unique_artists)
            .bind(stats.unique_albums)
            .bind(stats.scanned_at)
            .bind(stats.scan_duration_secs)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await?;

        Ok(stats)
    }

    /// Most recent snapshot, if any scan has completed
    pub async fn latest_statistics(&self) -> Result<Option<LibraryStatistics>> {
        let row: Option<(i64, i64, String, i64, i64, i64, f64)> = sqlx::query_as(
            r#"
            SELECT total_files, total_bytes, format_counts, unique_artists,
                   unique_albums, scanned_at, scan_duration
            FROM library_stats ORDER BY id DESC LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(
            |(total_files, total_bytes, format_json, unique_artists, unique_albums, scanned_at, scan_duration_secs)| {
                LibraryStatistics {
                    total_files,
                    total_bytes,
                    format_counts: serde_json::from_str(&format_json).unwrap_or_default(),
                    unique_artists,
                    unique_albums,
                    scanned_at,
                    scan_duration_secs,
                }
            },
        ))
    }
}

/// Get or create an artist row by exact name
async fn ensure_artist(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    name: Option<&str>,
) -> std::result::Result<Option<i64>, sqlx::Error> {
    let Some(name) = name else {
        return Ok(None);
    };

    sqlx::query("INSERT OR IGNORE INTO artists (name) VALUES (?)")
        .bind(name)
        .execute(&mut **tx)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM artists WHERE name = ?")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;

    Ok(Some(id))
}

/// Get or create an album row by (name, artist)
async fn ensure_album(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    name: Option<&str>,
    artist_id: Option<i64>,
) -> std::result::Result<Option<i64>, sqlx::Error> {
    let Some(name) = name else {
        return Ok(None);
    };

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM albums WHERE name = ? AND artist_id IS ?")
            .bind(name)
            .bind(artist_id)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some(id) = existing {
        return Ok(Some(id));
    }

    let id = sqlx::query("INSERT INTO albums (name, artist_id) VALUES (?, ?)")
        .bind(name)
        .bind(artist_id)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

    Ok(Some(id))
}
