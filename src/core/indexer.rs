//! Library indexer - scans directories and persists metadata
//!
//! The scan pipeline runs in two halves: a rayon worker pool executes the
//! read → hash → score stage per file and feeds a bounded channel, while a
//! single writer drains the channel and upserts into the store. `scan`
//! returns only after every accepted record has been persisted.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::db::Store;
use crate::error::{Error, FileError, Result};
use crate::models::{LibraryFile, ProgressEvent, ProgressFn, ScanFailure, ScanReport, UpsertOutcome};
use crate::utils::cancel::CancelToken;
use crate::utils::dates::{mtime_of, Clock};
use crate::utils::filesystem::collect_audio_files;
use crate::utils::hashing::{content_hash, metadata_hash};

use super::quality::quality_score;
use super::reader;

/// Soft per-file budget for the metadata read stage
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker pool is capped regardless of core count
const MAX_WORKERS: usize = 8;

/// Records flowing from the worker pool to the single writer
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Re-process files whose mtime and size are unchanged
    pub rescan: bool,
    /// Deactivate active rows under the root that the scan did not see
    /// (the `verify` operation)
    pub sweep_missing: bool,
}

enum WorkerMsg {
    Record(Box<LibraryFile>),
    Skipped(String),
    Failed { path: String, error: FileError },
}

/// Orchestrates scan → read → hash → score → upsert with incremental skip
pub struct Indexer {
    store: Arc<Store>,
    clock: Clock,
    workers: usize,
}

impl Indexer {
    pub fn new(store: Arc<Store>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_WORKERS);
        Indexer {
            store,
            clock: Clock::system(),
            workers,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Walk `root`, index every supported audio file, and append a
    /// statistics snapshot.
    pub async fn scan(
        &self,
        root: &Path,
        opts: ScanOptions,
        cancel: CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<ScanReport> {
        let started = Instant::now();

        if !root.is_dir() {
            return Err(Error::user(format!(
                "not a readable directory: {}",
                root.display()
            )));
        }
        let root = root
            .canonicalize()
            .map_err(|e| Error::user(format!("cannot resolve {}: {e}", root.display())))?;
        let root_str = root.to_string_lossy().to_string();

        let files = collect_audio_files(&root);
        let touched: HashSet<String> = files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        if let Some(cb) = &progress {
            cb(ProgressEvent::Started {
                total_files: files.len(),
            });
        }

        let known = self.store.known_files_under(&root_str).await?;
        let now = self.clock.now();

        let (tx, mut rx) = tokio::sync::mpsc::channel::<WorkerMsg>(CHANNEL_CAPACITY);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::Internal(format!("worker pool: {e}")))?;

        let producer = {
            let cancel = cancel.clone();
            let rescan = opts.rescan;
            tokio::task::spawn_blocking(move || {
                pool.install(|| {
                    files.par_iter().for_each(|path| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let msg = process_file(path, &known, rescan, now);
                        // writer gone means the scan is aborting; drop quietly
                        let _ = tx.blocking_send(msg);
                    });
                });
            })
        };

        let mut report = ScanReport::default();

        while let Some(msg) = rx.recv().await {
            let done_path = match msg {
                WorkerMsg::Record(file) => {
                    let path = file.path.clone();
                    match self.store.upsert_file(&file).await {
                        Ok(UpsertOutcome::Added) => report.added += 1,
                        Ok(UpsertOutcome::Updated) => report.updated += 1,
                        Ok(UpsertOutcome::Unchanged) => report.skipped += 1,
                        Err(e @ Error::Integrity(_)) => {
                            // corrupt store is fatal; stop accepting work
                            cancel.cancel();
                            drop(rx);
                            let _ = producer.await;
                            return Err(e);
                        }
                        Err(e) => {
                            tracing::warn!("failed to persist {path}: {e}");
                            report.errored += 1;
                            report.errors.push(ScanFailure {
                                path: path.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                    path
                }
                WorkerMsg::Skipped(path) => {
                    report.skipped += 1;
                    path
                }
                WorkerMsg::Failed { path, error } => {
                    tracing::debug!("skipping {path}: {error}");
                    report.errored += 1;
                    report.errors.push(ScanFailure {
                        path: path.clone(),
                        message: error.to_string(),
                    });
                    path
                }
            };

            if let Some(cb) = &progress {
                cb(ProgressEvent::FileDone {
                    path: done_path.into(),
                });
            }
        }

        producer
            .await
            .map_err(|e| Error::Internal(format!("scan worker panicked: {e}")))?;

        report.cancelled = cancel.is_cancelled();

        // missing-file sweep: only on request, and never on a partial scan
        if opts.sweep_missing && !report.cancelled {
            for path in self.store.list_active_paths_under(&root_str).await? {
                if !touched.contains(&path) {
                    tracing::info!("deactivating missing file {path}");
                    self.store.deactivate(&path).await?;
                    report.deactivated += 1;
                }
            }
        }

        report.duration = started.elapsed();
        report.statistics = self
            .store
            .record_statistics(report.duration.as_secs_f64(), now)
            .await?;

        tracing::info!(
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            errored = report.errored,
            deactivated = report.deactivated,
            "scan of {root_str} finished"
        );

        Ok(report)
    }
}

/// The worker half of the pipeline: stat, skip-check, read, hash, score.
fn process_file(
    path: &Path,
    known: &HashMap<String, (i64, i64, bool)>,
    rescan: bool,
    now: i64,
) -> WorkerMsg {
    let path_str = path.to_string_lossy().to_string();

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            return WorkerMsg::Failed {
                path: path_str,
                error: FileError::Io(e),
            }
        }
    };
    let size = meta.len() as i64;
    let mtime = mtime_of(&meta);

    if !rescan {
        if let Some((known_mtime, known_size, active)) = known.get(&path_str) {
            if *active && *known_mtime == mtime && *known_size == size {
                return WorkerMsg::Skipped(path_str);
            }
        }
    }

    let read_started = Instant::now();
    let props = match reader::read(path) {
        Ok(props) => props,
        Err(error) => {
            return WorkerMsg::Failed {
                path: path_str,
                error,
            }
        }
    };
    if read_started.elapsed() > READ_TIMEOUT {
        return WorkerMsg::Failed {
            path: path_str,
            error: FileError::Timeout {
                path: path.to_path_buf(),
                budget: READ_TIMEOUT,
            },
        };
    }

    let meta_hash = metadata_hash(props.artist.as_deref(), props.title.as_deref());
    let file_hash = match content_hash(path) {
        Ok(hash) => hash,
        Err(e) => {
            return WorkerMsg::Failed {
                path: path_str,
                error: FileError::Io(e),
            }
        }
    };

    let score = quality_score(&props, mtime, now);

    WorkerMsg::Record(Box::new(LibraryFile::from_scan(
        path, props, size, mtime, meta_hash, file_hash, score, now,
    )))
}
