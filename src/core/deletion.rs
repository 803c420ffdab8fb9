//! Safe deletion engine
//!
//! Plan → Validate → Execute. Nothing is mutated before validation passes:
//! a seven-point checklist runs per group, and execute re-runs it before
//! touching the filesystem. Execution failures are per-file and never
//! cascade to other groups; every physically-deleted file leaves a
//! DedupEvent behind.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::Store;
use crate::error::{Error, Result};
use crate::models::{AudioProperties, DedupEvent, DeletedBy, DeletionReason, LibraryFile};
use crate::utils::dates::{mtime_of, Clock};
use crate::utils::hashing::{content_hash, metadata_hash};
use crate::utils::ids::opaque_id;

use super::quality::quality_score;
use super::reader;

/// Safety margin demanded on the backup volume
const BACKUP_SPACE_FACTOR: f64 = 1.1;

/// One keep-this-delete-those decision
#[derive(Debug, Clone)]
pub struct DeletionGroup {
    /// 16-hex-char opaque identifier; names the backup subdirectory
    pub group_id: String,
    pub keep: PathBuf,
    pub deletes: Vec<PathBuf>,
    pub reason: DeletionReason,
}

impl DeletionGroup {
    /// Build a group, enforcing: deletes non-empty and distinct, and the
    /// keep path never among them.
    pub fn new(keep: PathBuf, deletes: Vec<PathBuf>, reason: DeletionReason) -> Result<Self> {
        if deletes.is_empty() {
            return Err(Error::Validation("delete set is empty".into()));
        }
        let distinct: HashSet<&PathBuf> = deletes.iter().collect();
        if distinct.len() != deletes.len() {
            return Err(Error::Validation("delete set contains duplicates".into()));
        }
        if deletes.contains(&keep) {
            return Err(Error::Validation(format!(
                "keep path {} is also listed for deletion",
                keep.display()
            )));
        }

        Ok(DeletionGroup {
            group_id: opaque_id(),
            keep,
            deletes,
            reason,
        })
    }
}

/// A set of groups executed under one session
#[derive(Debug, Clone)]
pub struct DeletionPlan {
    /// 16-hex-char opaque identifier; groups the session's DedupEvents and
    /// names its backup directory
    pub session_id: String,
    pub backup_dir: Option<PathBuf>,
    pub groups: Vec<DeletionGroup>,
}

impl DeletionPlan {
    pub fn new(backup_dir: Option<PathBuf>, groups: Vec<DeletionGroup>) -> Self {
        DeletionPlan {
            session_id: opaque_id(),
            backup_dir,
            groups,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One finding from the validation checklist
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub level: Severity,
    pub checkpoint: &'static str,
    pub message: String,
}

impl ValidationResult {
    fn error(checkpoint: &'static str, message: String) -> Self {
        ValidationResult {
            level: Severity::Error,
            checkpoint,
            message,
        }
    }

    fn warning(checkpoint: &'static str, message: String) -> Self {
        ValidationResult {
            level: Severity::Warning,
            checkpoint,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Report what would happen without touching filesystem or store
    pub dry_run: bool,
    /// Copy every delete into the session backup directory first
    pub create_backup: bool,
    pub deleted_by: DeletedBy,
}

/// Per-file and per-group outcome of one execution
#[derive(Debug, Clone, Default)]
pub struct DeletionStats {
    pub total_groups: u64,
    pub successful_deletions: u64,
    pub failed_deletions: u64,
    pub files_deleted: u64,
    pub files_failed: u64,
    pub space_freed_bytes: u64,
    pub backup_created: bool,
    pub backup_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Everything we need to know about a delete file, captured before any
/// mutation so the audit row survives the unlink
struct PendingDelete {
    path: PathBuf,
    path_str: String,
    filename: String,
    size: i64,
    mtime: i64,
    row: Option<LibraryFile>,
    props: Option<AudioProperties>,
    meta_hash: String,
    file_hash: String,
}

pub struct DeletionEngine {
    store: Arc<Store>,
    clock: Clock,
}

impl DeletionEngine {
    pub fn new(store: Arc<Store>) -> Self {
        DeletionEngine {
            store,
            clock: Clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ========== Validate ==========

    /// Run the seven-point checklist over every group. The plan may be
    /// executed only when no Error-level result comes back.
    pub async fn validate(&self, plan: &DeletionPlan) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();

        for group in &plan.groups {
            self.validate_group(group, &mut results).await?;
        }

        // checkpoint 7: backup disk space, once per plan, attributed to the
        // first group for reporting
        if let Some(backup_dir) = &plan.backup_dir {
            let needed: u64 = plan
                .groups
                .iter()
                .flat_map(|g| &g.deletes)
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();
            let needed = (needed as f64 * BACKUP_SPACE_FACTOR) as u64;

            match available_space(backup_dir) {
                Some(available) if available < needed => {
                    let group = plan
                        .groups
                        .first()
                        .map(|g| g.group_id.as_str())
                        .unwrap_or("-");
                    results.push(ValidationResult::error(
                        "backup_space",
                        format!(
                            "group {group}: backup volume has {available} bytes free, {needed} required"
                        ),
                    ));
                }
                Some(_) => {}
                None => results.push(ValidationResult::warning(
                    "backup_space",
                    format!(
                        "could not determine free space under {}",
                        backup_dir.display()
                    ),
                )),
            }
        }

        Ok(results)
    }

    async fn validate_group(
        &self,
        group: &DeletionGroup,
        results: &mut Vec<ValidationResult>,
    ) -> Result<()> {
        let gid = &group.group_id;
        let keep_str = group.keep.to_string_lossy().to_string();

        // 1: keep file exists and is a readable regular file
        let keep_ok = is_readable_file(&group.keep);
        if !keep_ok {
            results.push(ValidationResult::error(
                "keep_exists",
                format!("group {gid}: keep file is not readable: {keep_str}"),
            ));
        }

        // 2: non-empty delete set (constructor enforces it; re-checked for
        // plans built by hand)
        if group.deletes.is_empty() {
            results.push(ValidationResult::error(
                "non_empty_deletes",
                format!("group {gid}: delete set is empty"),
            ));
        }

        // 3: quality-downgrade guard
        if keep_ok {
            if let Some(keep_score) = self.score_on_disk(&group.keep) {
                for delete in &group.deletes {
                    if let Some(delete_score) = self.score_on_disk(delete) {
                        if delete_score > keep_score {
                            results.push(ValidationResult::warning(
                                "quality_guard",
                                format!(
                                    "group {gid}: deleting higher-quality file than kept \
                                     ({} scores {delete_score}, keep scores {keep_score})",
                                    delete.display()
                                ),
                            ));
                        }
                    }
                }
            }
        }

        // 4: every delete exists and is a readable regular file
        for delete in &group.deletes {
            if !is_readable_file(delete) {
                results.push(ValidationResult::error(
                    "deletes_exist",
                    format!("group {gid}: delete file is not readable: {}", delete.display()),
                ));
            }
        }

        // 5: the deletes must not cover every surviving copy of the kept
        // recording
        if let Some(keep_hash) = self.keep_metadata_hash(&keep_str, &group.keep).await? {
            let mapped = self.store.lookup_by_metadata_hash(&keep_hash).await?;
            let delete_set: HashSet<String> = group
                .deletes
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            if !mapped.is_empty() && mapped.iter().all(|m| delete_set.contains(&m.path)) {
                results.push(ValidationResult::error(
                    "not_all_of_group",
                    format!(
                        "group {gid}: deletes would remove every library copy of the kept recording"
                    ),
                ));
            }
        }

        // 6: write permission on each delete and its parent directory
        for delete in &group.deletes {
            if let Ok(meta) = std::fs::metadata(delete) {
                if meta.permissions().readonly() {
                    results.push(ValidationResult::error(
                        "write_permission",
                        format!("group {gid}: delete file is read-only: {}", delete.display()),
                    ));
                }
            }
            if let Some(parent) = delete.parent() {
                if !dir_is_writable(parent) {
                    results.push(ValidationResult::error(
                        "write_permission",
                        format!(
                            "group {gid}: parent directory is not writable: {}",
                            parent.display()
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Keep's metadata hash: from its store row when indexed, from its tags
    /// otherwise. None when neither source is available.
    async fn keep_metadata_hash(&self, keep_str: &str, keep: &Path) -> Result<Option<String>> {
        if let Some(row) = self.store.get_by_path(keep_str).await? {
            return Ok(Some(row.metadata_hash));
        }
        Ok(reader::read(keep)
            .ok()
            .map(|props| metadata_hash(props.artist.as_deref(), props.title.as_deref())))
    }

    /// Quality score of a file as it stands on disk; None when it cannot be
    /// read as audio
    fn score_on_disk(&self, path: &Path) -> Option<u8> {
        let props = reader::read(path).ok()?;
        let mtime = std::fs::metadata(path).map(|m| mtime_of(&m)).unwrap_or(0);
        Some(quality_score(&props, mtime, self.clock.now()))
    }

    // ========== Execute ==========

    /// Execute a validated plan.
    ///
    /// Validation is re-run first; if it now fails, the engine refuses with
    /// zero mutations and reports the errors in the returned stats. A
    /// second plan is refused while one is executing.
    pub async fn execute(&self, plan: &DeletionPlan, opts: ExecuteOptions) -> Result<DeletionStats> {
        if opts.create_backup && plan.backup_dir.is_none() {
            return Err(Error::user("create_backup requires a backup directory"));
        }

        let results = self.validate(plan).await?;

        let mut stats = DeletionStats {
            total_groups: plan.groups.len() as u64,
            ..Default::default()
        };
        for result in &results {
            match result.level {
                Severity::Error => stats.errors.push(result.message.clone()),
                Severity::Warning => stats.warnings.push(result.message.clone()),
                Severity::Info => {}
            }
        }

        if !stats.errors.is_empty() {
            tracing::warn!(
                "refusing deletion plan {}: {} validation error(s)",
                plan.session_id,
                stats.errors.len()
            );
            return Ok(stats);
        }

        // one plan at a time, guarded through the store
        if let Some(active) = self.store.active_session().await? {
            return Err(Error::integrity(format!(
                "deletion session {active} is already executing"
            )));
        }
        if !opts.dry_run {
            self.store.set_active_session(&plan.session_id).await?;
        }

        let run = self.run_groups(plan, opts, &mut stats).await;

        if !opts.dry_run {
            self.store.clear_active_session().await?;
        }
        run?;

        tracing::info!(
            session = %plan.session_id,
            deleted = stats.files_deleted,
            failed = stats.files_failed,
            dry_run = opts.dry_run,
            "deletion plan finished"
        );

        Ok(stats)
    }

    async fn run_groups(
        &self,
        plan: &DeletionPlan,
        opts: ExecuteOptions,
        stats: &mut DeletionStats,
    ) -> Result<()> {
        for group in &plan.groups {
            match self.run_group(plan, group, opts, stats).await? {
                true => stats.successful_deletions += 1,
                false => stats.failed_deletions += 1,
            }
        }
        Ok(())
    }

    async fn run_group(
        &self,
        plan: &DeletionPlan,
        group: &DeletionGroup,
        opts: ExecuteOptions,
        stats: &mut DeletionStats,
    ) -> Result<bool> {
        let now = self.clock.now();
        let keep_str = group.keep.to_string_lossy().to_string();
        let kept_row = self.store.get_by_path(&keep_str).await?;

        // capture everything the audit trail needs before any mutation
        let mut pending = Vec::with_capacity(group.deletes.len());
        for path in &group.deletes {
            pending.push(self.snapshot_delete(path).await?);
        }

        // backup phase: a failed copy aborts the group, already-copied
        // files are left in place
        let mut recovery: HashMap<String, String> = HashMap::new();
        let backup_root = plan
            .backup_dir
            .as_ref()
            .filter(|_| opts.create_backup && !opts.dry_run);
        if let Some(backup_dir) = backup_root {
            let dest_dir = backup_dir.join(&plan.session_id).join(&group.group_id);
            if let Err(e) = std::fs::create_dir_all(&dest_dir) {
                stats.errors.push(format!(
                    "group {}: cannot create backup directory: {e}",
                    group.group_id
                ));
                stats.files_failed += pending.len() as u64;
                return Ok(false);
            }

            for item in &pending {
                let dest = dest_dir.join(&item.filename);
                match copy_preserving_mtime(&item.path, &dest) {
                    Ok(()) => {
                        recovery.insert(item.path_str.clone(), dest.to_string_lossy().to_string());
                    }
                    Err(e) => {
                        stats.errors.push(format!(
                            "group {}: backup of {} failed: {e}",
                            group.group_id, item.path_str
                        ));
                        stats.files_failed += pending.len() as u64;
                        return Ok(false);
                    }
                }
            }

            stats.backup_created = true;
            stats.backup_path = Some(backup_dir.join(&plan.session_id));
        }

        // unlink phase: best-effort sequential, a failure aborts the
        // group's remaining unlinks
        let mut handled = Vec::with_capacity(pending.len());
        let mut group_failed = false;
        for item in &pending {
            if !opts.dry_run {
                if let Err(e) = std::fs::remove_file(&item.path) {
                    stats
                        .errors
                        .push(format!("failed to delete {}: {e}", item.path_str));
                    group_failed = true;
                    break;
                }
            }
            stats.files_deleted += 1;
            stats.space_freed_bytes += item.size as u64;
            handled.push(item);
        }
        if group_failed {
            stats.files_failed += (pending.len() - handled.len()) as u64;
        }

        // history phase: deactivate rows and append audit events
        if !opts.dry_run {
            for item in handled {
                if item.row.is_some() {
                    self.store.deactivate(&item.path_str).await?;
                }
                let event = build_event(plan, group, item, kept_row.as_ref(), &recovery, opts, now);
                self.store.record_dedup_event(&event).await?;
            }
        }

        Ok(!group_failed)
    }

    async fn snapshot_delete(&self, path: &Path) -> Result<PendingDelete> {
        let path_str = path.to_string_lossy().to_string();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());
        let meta = std::fs::metadata(path).ok();
        let size = meta.as_ref().map(|m| m.len() as i64).unwrap_or(0);
        let mtime = meta.as_ref().map(mtime_of).unwrap_or(0);

        let row = self.store.get_by_path(&path_str).await?;

        // files outside the index need their fingerprints taken now; after
        // the unlink there is nothing left to hash
        let (props, meta_hash, file_hash) = match &row {
            Some(row) => (None, row.metadata_hash.clone(), row.content_hash.clone()),
            None => {
                let props = reader::read(path).ok();
                let meta_hash = props
                    .as_ref()
                    .map(|p| metadata_hash(p.artist.as_deref(), p.title.as_deref()))
                    .unwrap_or_else(|| metadata_hash(None, None));
                let file_hash = content_hash(path).unwrap_or_default();
                (props, meta_hash, file_hash)
            }
        };

        Ok(PendingDelete {
            path: path.to_path_buf(),
            path_str,
            filename,
            size,
            mtime,
            row,
            props,
            meta_hash,
            file_hash,
        })
    }
}

fn build_event(
    plan: &DeletionPlan,
    group: &DeletionGroup,
    item: &PendingDelete,
    kept_row: Option<&LibraryFile>,
    recovery: &HashMap<String, String>,
    opts: ExecuteOptions,
    now: i64,
) -> DedupEvent {
    let recovery_path = recovery.get(&item.path_str).cloned();

    let (format, artist, title, album, year, duration_secs, bitrate, sample_rate, quality) =
        match (&item.row, &item.props) {
            (Some(row), _) => (
                row.format.clone(),
                row.artist.clone(),
                row.title.clone(),
                row.album.clone(),
                row.year,
                row.duration_secs,
                row.bitrate_kbps,
                row.sample_rate_hz,
                row.quality_score,
            ),
            (None, Some(props)) => (
                props.format.clone(),
                props.artist.clone(),
                props.title.clone(),
                props.album.clone(),
                props.year,
                props.duration_secs,
                props.bitrate_kbps,
                props.sample_rate_hz,
                quality_score(props, item.mtime, now),
            ),
            (None, None) => (
                item.path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase())
                    .unwrap_or_default(),
                None,
                None,
                None,
                None,
                0.0,
                None,
                None,
                0,
            ),
        };

    DedupEvent {
        id: 0,
        session_id: plan.session_id.clone(),
        file_path: item.path_str.clone(),
        filename: item.filename.clone(),
        size: item.size,
        format,
        artist,
        title,
        album,
        year,
        duration_secs,
        bitrate_kbps: bitrate,
        sample_rate_hz: sample_rate,
        quality_score: quality,
        metadata_hash: item.meta_hash.clone(),
        content_hash: item.file_hash.clone(),
        deletion_reason: group.reason,
        kept_file_path: group.keep.to_string_lossy().to_string(),
        kept_file_id: kept_row.map(|r| r.id),
        confidence_score: 1.0,
        matched_by: group.reason.matched_by(),
        original_library_id: item.row.as_ref().map(|r| r.id),
        can_recover: recovery_path.is_some(),
        recovery_path,
        deleted_by: opts.deleted_by,
        notes: None,
        deleted_at: now,
    }
}

fn is_readable_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
        && std::fs::File::open(path).is_ok()
}

/// Probe writability by creating (and immediately removing) a temp file
fn dir_is_writable(dir: &Path) -> bool {
    tempfile::Builder::new()
        .prefix(".mt-probe")
        .tempfile_in(dir)
        .is_ok()
}

fn copy_preserving_mtime(src: &Path, dest: &Path) -> std::io::Result<()> {
    let mtime = std::fs::metadata(src)?.modified()?;
    std::fs::copy(src, dest)?;
    let file = std::fs::File::options().write(true).open(dest)?;
    file.set_modified(mtime)?;
    Ok(())
}

/// Free bytes on the volume holding `path` (nearest existing ancestor)
fn available_space(path: &Path) -> Option<u64> {
    use sysinfo::{DiskExt, System, SystemExt};

    let target = path
        .ancestors()
        .find(|p| p.exists())?
        .canonicalize()
        .ok()?;

    let mut sys = System::new();
    sys.refresh_disks_list();
    sys.disks()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpsertOutcome;

    fn plain_file(dir: &Path, name: &str, bytes: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0x55u8; bytes]).unwrap();
        path
    }

    async fn store_with_row(path: &Path, artist: &str, title: &str) -> Arc<Store> {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let file = LibraryFile::from_scan(
            path,
            AudioProperties {
                format: "mp3".into(),
                artist: Some(artist.into()),
                title: Some(title.into()),
                ..Default::default()
            },
            std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0),
            1,
            metadata_hash(Some(artist), Some(title)),
            content_hash(path).unwrap_or_default(),
            50,
            1_750_000_000,
        );
        assert_eq!(store.upsert_file(&file).await.unwrap(), UpsertOutcome::Added);
        store
    }

    #[test]
    fn group_constructor_enforces_invariants() {
        let keep = PathBuf::from("/lib/a.flac");

        let err = DeletionGroup::new(keep.clone(), vec![], DeletionReason::ExactContent)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = DeletionGroup::new(
            keep.clone(),
            vec![keep.clone()],
            DeletionReason::ExactContent,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = DeletionGroup::new(
            keep.clone(),
            vec![PathBuf::from("/x.mp3"), PathBuf::from("/x.mp3")],
            DeletionReason::ExactContent,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let group = DeletionGroup::new(
            keep,
            vec![PathBuf::from("/x.mp3")],
            DeletionReason::ExactContent,
        )
        .unwrap();
        assert_eq!(group.group_id.len(), 16);
    }

    #[tokio::test]
    async fn missing_keep_refuses_with_zero_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let delete = plain_file(dir.path(), "dupe.mp3", 512);
        let store = store_with_row(&delete, "Daft Punk", "Contact").await;

        let group = DeletionGroup::new(
            dir.path().join("missing.flac"),
            vec![delete.clone()],
            DeletionReason::LowerQuality,
        )
        .unwrap();
        let plan = DeletionPlan::new(None, vec![group]);

        let engine = DeletionEngine::new(Arc::clone(&store));
        let results = engine.validate(&plan).await.unwrap();
        assert!(results
            .iter()
            .any(|r| r.level == Severity::Error && r.checkpoint == "keep_exists"));

        let stats = engine
            .execute(&plan, ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.successful_deletions, 0);
        assert_eq!(stats.files_deleted, 0);
        assert!(!stats.errors.is_empty());

        // nothing moved: file still on disk, row still active, no history
        assert!(delete.exists());
        assert_eq!(store.count_active().await.unwrap(), 1);
        assert!(store
            .list_dedup_events(&plan.session_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let keep = plain_file(dir.path(), "keep.mp3", 64);
        let delete = plain_file(dir.path(), "dupe.mp3", 2048);
        let store = store_with_row(&delete, "Daft Punk", "Contact").await;

        let group =
            DeletionGroup::new(keep, vec![delete.clone()], DeletionReason::ExactContent).unwrap();
        let plan = DeletionPlan::new(None, vec![group]);

        let engine = DeletionEngine::new(Arc::clone(&store));
        let stats = engine
            .execute(
                &plan,
                ExecuteOptions {
                    dry_run: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.successful_deletions, 1);
        assert_eq!(stats.space_freed_bytes, 2048);

        assert!(delete.exists());
        assert_eq!(store.count_active().await.unwrap(), 1);
        assert!(store
            .list_dedup_events(&plan.session_id)
            .await
            .unwrap()
            .is_empty());
        // the guard was never written
        assert_eq!(store.active_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn execute_deletes_backs_up_and_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        let keep = plain_file(dir.path(), "keep.mp3", 64);
        let delete = plain_file(dir.path(), "dupe.mp3", 2048);
        let store = store_with_row(&delete, "Daft Punk", "Contact").await;

        let group = DeletionGroup::new(
            keep.clone(),
            vec![delete.clone()],
            DeletionReason::LowerQuality,
        )
        .unwrap();
        let plan = DeletionPlan::new(Some(backup.path().to_path_buf()), vec![group]);
        let group_id = plan.groups[0].group_id.clone();

        let engine = DeletionEngine::new(Arc::clone(&store)).with_clock(Clock::fixed(1_760_000_000));
        let stats = engine
            .execute(
                &plan,
                ExecuteOptions {
                    create_backup: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.files_failed, 0);
        assert!(stats.backup_created);
        assert!(!delete.exists());

        let backed_up = backup
            .path()
            .join(&plan.session_id)
            .join(&group_id)
            .join("dupe.mp3");
        assert!(backed_up.exists());

        let row = store
            .get_by_path(&delete.to_string_lossy())
            .await
            .unwrap()
            .unwrap();
        assert!(!row.is_active);

        let events = store.list_dedup_events(&plan.session_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].deletion_reason, DeletionReason::LowerQuality);
        assert!(events[0].can_recover);
        assert_eq!(
            events[0].recovery_path.as_deref(),
            Some(backed_up.to_string_lossy().as_ref())
        );
        assert_eq!(events[0].deleted_at, 1_760_000_000);

        // guard released
        assert_eq!(store.active_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_plan_is_refused_while_one_executes() {
        let dir = tempfile::tempdir().unwrap();
        let keep = plain_file(dir.path(), "keep.mp3", 64);
        let delete = plain_file(dir.path(), "dupe.mp3", 128);
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.set_active_session("feedbeef00000000").await.unwrap();

        let group =
            DeletionGroup::new(keep, vec![delete], DeletionReason::UserRequested).unwrap();
        let plan = DeletionPlan::new(None, vec![group]);

        let engine = DeletionEngine::new(store);
        let err = engine
            .execute(&plan, ExecuteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "integrity");
    }

    #[tokio::test]
    async fn deleting_every_copy_of_a_recording_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let keep = plain_file(dir.path(), "keep.mp3", 64);
        let delete = plain_file(dir.path(), "only_copy.mp3", 128);

        // the delete is the only active copy of this recording; the keep
        // file is known but was deactivated earlier
        let store = store_with_row(&delete, "Daft Punk", "Voyager").await;
        let keep_row = LibraryFile::from_scan(
            &keep,
            AudioProperties {
                format: "mp3".into(),
                artist: Some("Daft Punk".into()),
                title: Some("Voyager".into()),
                ..Default::default()
            },
            64,
            1,
            metadata_hash(Some("Daft Punk"), Some("Voyager")),
            "0".repeat(32),
            50,
            1_750_000_000,
        );
        store.upsert_file(&keep_row).await.unwrap();
        store.deactivate(&keep.to_string_lossy()).await.unwrap();

        let group = DeletionGroup::new(
            keep.clone(),
            vec![delete.clone()],
            DeletionReason::ExactMetadata,
        )
        .unwrap();
        let plan = DeletionPlan::new(None, vec![group]);

        let engine = DeletionEngine::new(Arc::clone(&store));
        let results = engine.validate(&plan).await.unwrap();
        assert!(results
            .iter()
            .any(|r| r.level == Severity::Error && r.checkpoint == "not_all_of_group"));

        let stats = engine
            .execute(&plan, ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.files_deleted, 0);
        assert!(delete.exists());
    }

    #[tokio::test]
    async fn execute_revalidates_and_catches_vanished_files() {
        let dir = tempfile::tempdir().unwrap();
        let keep = plain_file(dir.path(), "keep.mp3", 64);
        let gone = dir.path().join("vanished.mp3");
        std::fs::write(&gone, b"x").unwrap();
        let other_keep = plain_file(dir.path(), "keep2.mp3", 64);
        let other_delete = plain_file(dir.path(), "dupe2.mp3", 256);

        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let g1 =
            DeletionGroup::new(keep, vec![gone.clone()], DeletionReason::UserRequested).unwrap();
        let g2 = DeletionGroup::new(
            other_keep,
            vec![other_delete.clone()],
            DeletionReason::UserRequested,
        )
        .unwrap();
        let plan = DeletionPlan::new(None, vec![g1, g2]);

        let engine = DeletionEngine::new(Arc::clone(&store));
        let results = engine.validate(&plan).await.unwrap();
        assert!(results.iter().all(|r| r.level != Severity::Error));

        // the file disappears between validate and execute; the re-run at
        // the top of execute refuses the whole plan before any mutation
        std::fs::remove_file(&gone).unwrap();

        let stats = engine
            .execute(&plan, ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.successful_deletions, 0);
        assert_eq!(stats.files_deleted, 0);
        assert!(!stats.errors.is_empty());
        assert!(other_delete.exists());
    }
}
