//! Reports, statistics snapshots, and history rows

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::enums::{DeletedBy, DeletionReason, MatchedBy, UserAction};
use super::file::LibraryFile;

/// Snapshot of the whole index, appended after every successful scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryStatistics {
    pub total_files: i64,
    pub total_bytes: i64,
    /// format → active file count
    pub format_counts: HashMap<String, i64>,
    pub unique_artists: i64,
    pub unique_albums: i64,
    /// Unix seconds of the scan that produced this snapshot
    pub scanned_at: i64,
    pub scan_duration_secs: f64,
}

/// One file the scan could not process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub path: String,
    pub message: String,
}

/// Counts returned by a single `index`/`verify` call
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub added: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errored: u64,
    pub deactivated: u64,
    pub duration: Duration,
    pub statistics: LibraryStatistics,
    pub errors: Vec<ScanFailure>,
    pub cancelled: bool,
}

/// Progress events surfaced to the caller during long operations.
///
/// The core emits no textual output; rendering belongs to the shell.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { total_files: usize },
    FileDone { path: PathBuf },
}

pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// One candidate file from an import batch, with its match when one exists
#[derive(Debug, Clone)]
pub struct VetEntry {
    pub path: String,
    pub matched: Option<LibraryFile>,
    pub confidence: Option<f64>,
    pub matched_by: Option<MatchedBy>,
}

/// Outcome of one `vet` call
#[derive(Debug, Clone, Default)]
pub struct VettingReport {
    pub import_path: String,
    pub total_files: u64,
    pub threshold: f64,
    pub duration: Duration,
    pub new: Vec<VetEntry>,
    pub duplicates: Vec<VetEntry>,
    pub uncertain: Vec<VetEntry>,
    pub errors: Vec<ScanFailure>,
    pub cancelled: bool,
}

/// Persisted record of one vetting invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VettingRun {
    pub id: i64,
    pub import_path: String,
    pub total_files: i64,
    pub duplicates: i64,
    pub new_files: i64,
    pub uncertain: i64,
    pub threshold: f64,
    pub completed_at: i64,
}

/// Audit row written for each physically-deleted file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupEvent {
    pub id: i64,
    /// Groups the events of one deletion execution
    pub session_id: String,
    pub file_path: String,
    pub filename: String,
    pub size: i64,
    pub format: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub duration_secs: f64,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub quality_score: u8,
    pub metadata_hash: String,
    pub content_hash: String,
    pub deletion_reason: DeletionReason,
    pub kept_file_path: String,
    pub kept_file_id: Option<i64>,
    pub confidence_score: f64,
    pub matched_by: MatchedBy,
    pub original_library_id: Option<i64>,
    pub can_recover: bool,
    pub recovery_path: Option<String>,
    pub deleted_by: DeletedBy,
    pub notes: Option<String>,
    pub deleted_at: i64,
}

/// A library file suggested for a lossless upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeCandidate {
    pub id: i64,
    pub library_file_id: i64,
    pub current_format: String,
    pub current_bitrate_kbps: Option<u32>,
    pub current_quality_score: u8,
    pub recommended_format: String,
    pub potential_quality_gain: u8,
    /// 0–100
    pub priority_score: u8,
    pub user_action: UserAction,
    pub created_at: i64,
    pub updated_at: i64,
}
