//! Vetting history, dedup audit trail, and upgrade candidates

use sqlx::FromRow;

use crate::error::Result;
use crate::models::{
    DedupEvent, DeletedBy, DeletionReason, MatchedBy, UpgradeCandidate, UserAction, VettingRun,
};

use super::store::Store;

#[derive(Debug, FromRow)]
struct VettingRunRow {
    id: i64,
    import_path: String,
    total_files: i64,
    duplicates: i64,
    new_files: i64,
    uncertain: i64,
    threshold: f64,
    completed_at: i64,
}

impl VettingRunRow {
    fn into_model(self) -> VettingRun {
        VettingRun {
            id: self.id,
            import_path: self.import_path,
            total_files: self.total_files,
            duplicates: self.duplicates,
            new_files: self.new_files,
            uncertain: self.uncertain,
            threshold: self.threshold,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DedupEventRow {
    id: i64,
    session_id: String,
    file_path: String,
    filename: String,
    size: i64,
    format: String,
    artist: Option<String>,
    title: Option<String>,
    album: Option<String>,
    year: Option<i64>,
    duration: f64,
    bitrate: Option<i64>,
    sample_rate: Option<i64>,
    quality_score: i64,
    metadata_hash: String,
    content_hash: String,
    deletion_reason: String,
    kept_file_path: String,
    kept_file_id: Option<i64>,
    confidence_score: f64,
    matched_by: String,
    original_library_id: Option<i64>,
    can_recover: bool,
    recovery_path: Option<String>,
    deleted_by: String,
    notes: Option<String>,
    deleted_at: i64,
}

impl DedupEventRow {
    fn into_model(self) -> DedupEvent {
        DedupEvent {
            id: self.id,
            session_id: self.session_id,
            file_path: self.file_path,
            filename: self.filename,
            size: self.size,
            format: self.format,
            artist: self.artist,
            title: self.title,
            album: self.album,
            year: self.year.map(|y| y as i32),
            duration_secs: self.duration,
            bitrate_kbps: self.bitrate.map(|b| b as u32),
            sample_rate_hz: self.sample_rate.map(|s| s as u32),
            quality_score: self.quality_score.clamp(0, 100) as u8,
            metadata_hash: self.metadata_hash,
            content_hash: self.content_hash,
            deletion_reason: DeletionReason::from_str(&self.deletion_reason)
                .unwrap_or(DeletionReason::UserRequested),
            kept_file_path: self.kept_file_path,
            kept_file_id: self.kept_file_id,
            confidence_score: self.confidence_score,
            matched_by: MatchedBy::from_str(&self.matched_by).unwrap_or(MatchedBy::Fuzzy),
            original_library_id: self.original_library_id,
            can_recover: self.can_recover,
            recovery_path: self.recovery_path,
            deleted_by: DeletedBy::from_str(&self.deleted_by),
            notes: self.notes,
            deleted_at: self.deleted_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct UpgradeCandidateRow {
    id: i64,
    library_file_id: i64,
    current_format: String,
    current_bitrate: Option<i64>,
    current_quality_score: i64,
    recommended_format: String,
    potential_quality_gain: i64,
    priority_score: i64,
    user_action: String,
    created_at: i64,
    updated_at: i64,
}

impl UpgradeCandidateRow {
    fn into_model(self) -> UpgradeCandidate {
        UpgradeCandidate {
            id: self.id,
            library_file_id: self.library_file_id,
            current_format: self.current_format,
            current_bitrate_kbps: self.current_bitrate.map(|b| b as u32),
            current_quality_score: self.current_quality_score.clamp(0, 100) as u8,
            recommended_format: self.recommended_format,
            potential_quality_gain: self.potential_quality_gain.clamp(0, 100) as u8,
            priority_score: self.priority_score.clamp(0, 100) as u8,
            user_action: UserAction::from_str(&self.user_action).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Store {
    // ========== Vetting history ==========

    #[allow(clippy::too_many_arguments)]
    pub async fn record_vetting_run(
        &self,
        import_path: &str,
        total_files: i64,
        duplicates: i64,
        new_files: i64,
        uncertain: i64,
        threshold: f64,
        completed_at: i64,
    ) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO vetting_history (
                    import_path, total_files, duplicates, new_files,
                    uncertain, threshold, completed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(import_path)
            .bind(total_files)
            .bind(duplicates)
            .bind(new_files)
            .bind(uncertain)
            .bind(threshold)
            .bind(completed_at)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    /// Most recent vetting runs, newest first
    pub async fn list_vetting_history(&self, limit: i64) -> Result<Vec<VettingRun>> {
        let rows: Vec<VettingRunRow> =
            sqlx::query_as("SELECT * FROM vetting_history ORDER BY completed_at DESC, id DESC LIMIT ?")
                .bind(limit)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    // ========== Dedup audit trail ==========

    pub async fn record_dedup_event(&self, event: &DedupEvent) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO dedup_events (
                    session_id, file_path, filename, size, format, artist,
                    title, album, year, duration, bitrate, sample_rate,
                    quality_score, metadata_hash, content_hash, deletion_reason,
                    kept_file_path, kept_file_id, confidence_score, matched_by,
                    original_library_id, can_recover, recovery_path, deleted_by,
                    notes, deleted_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.session_id)
            .bind(&event.file_path)
            .bind(&event.filename)
            .bind(event.size)
            .bind(&event.format)
            .bind(&event.artist)
            .bind(&event.title)
            .bind(&event.album)
            .bind(event.year)
            .bind(event.duration_secs)
            .bind(event.bitrate_kbps.map(|b| b as i64))
            .bind(event.sample_rate_hz.map(|s| s as i64))
            .bind(event.quality_score as i64)
            .bind(&event.metadata_hash)
            .bind(&event.content_hash)
            .bind(event.deletion_reason.as_str())
            .bind(&event.kept_file_path)
            .bind(event.kept_file_id)
            .bind(event.confidence_score)
            .bind(event.matched_by.as_str())
            .bind(event.original_library_id)
            .bind(event.can_recover)
            .bind(&event.recovery_path)
            .bind(event.deleted_by.as_str())
            .bind(&event.notes)
            .bind(event.deleted_at)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    /// Every event of one deletion session, in insertion order
    pub async fn list_dedup_events(&self, session_id: &str) -> Result<Vec<DedupEvent>> {
        let rows: Vec<DedupEventRow> =
            sqlx::query_as("SELECT * FROM dedup_events WHERE session_id = ? ORDER BY id")
                .bind(session_id)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    // ========== Upgrade candidates ==========

    /// Insert or refresh a suggestion. An existing row keeps its
    /// `user_action`; the measurements and priority are updated.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_upgrade_candidate(
        &self,
        library_file_id: i64,
        current_format: &str,
        current_bitrate_kbps: Option<u32>,
        current_quality_score: u8,
        recommended_format: &str,
        potential_quality_gain: u8,
        priority_score: u8,
        now: i64,
    ) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO upgrade_candidates (
                    library_file_id, current_format, current_bitrate,
                    current_quality_score, recommended_format,
                    potential_quality_gain, priority_score, user_action,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
                ON CONFLICT(library_file_id) DO UPDATE SET
                    current_format = excluded.current_format,
                    current_bitrate = excluded.current_bitrate,
                    current_quality_score = excluded.current_quality_score,
                    recommended_format = excluded.recommended_format,
                    potential_quality_gain = excluded.potential_quality_gain,
                    priority_score = excluded.priority_score,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(library_file_id)
            .bind(current_format)
            .bind(current_bitrate_kbps.map(|b| b as i64))
            .bind(current_quality_score as i64)
            .bind(recommended_format)
            .bind(potential_quality_gain as i64)
            .bind(priority_score as i64)
            .bind(now)
            .bind(now)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    /// Candidates at or above a priority, optionally filtered by action,
    /// highest priority first
    pub async fn list_upgrade_candidates(
        &self,
        min_priority: u8,
        action: Option<UserAction>,
    ) -> Result<Vec<UpgradeCandidate>> {
        let rows: Vec<UpgradeCandidateRow> = match action {
            Some(action) => {
                sqlx::query_as(
                    "SELECT * FROM upgrade_candidates
                     WHERE priority_score >= ? AND user_action = ?
                     ORDER BY priority_score DESC, id",
                )
                .bind(min_priority as i64)
                .bind(action.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM upgrade_candidates
                     WHERE priority_score >= ?
                     ORDER BY priority_score DESC, id",
                )
                .bind(min_priority as i64)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.into_iter().map(|r| r.into_model()).collect())
    }

    pub async fn set_upgrade_action(
        &self,
        library_file_id: i64,
        action: UserAction,
        now: i64,
    ) -> Result<()> {
        self.with_retry(|| async {
            sqlx::query(
                "UPDATE upgrade_candidates SET user_action = ?, updated_at = ? WHERE library_file_id = ?",
            )
            .bind(action.as_str())
            .bind(now)
            .bind(library_file_id)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }
}
