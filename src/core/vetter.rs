//! Import vetting
//!
//! Enumerates an import directory, runs the reader + hasher pass per
//! candidate, and classifies every file through the duplicate checker into
//! exactly one of new / duplicate / uncertain.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::db::Store;
use crate::error::{Error, Result};
use crate::models::{
    MatchedBy, ProgressEvent, ProgressFn, ScanFailure, VetEntry, VettingReport,
};
use crate::utils::cancel::CancelToken;
use crate::utils::dates::Clock;
use crate::utils::filesystem::collect_audio_files;
use crate::utils::hashing::{content_hash, metadata_hash};

use super::checker::{Candidate, DuplicateChecker, MatchResult};
use super::reader;

/// Fuzzy confidence at or above this counts as a certain duplicate
const CERTAIN_CONFIDENCE: f64 = 0.95;

const MAX_WORKERS: usize = 8;
const CHANNEL_CAPACITY: usize = 256;

enum WorkerMsg {
    Candidate(Box<Candidate>),
    Failed { path: String, message: String },
}

/// Batch-classifies a directory of candidates against the library
pub struct Vetter {
    store: Arc<Store>,
    checker: DuplicateChecker,
    clock: Clock,
    workers: usize,
}

impl Vetter {
    pub fn new(store: Arc<Store>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_WORKERS);
        Vetter {
            checker: DuplicateChecker::new(Arc::clone(&store)),
            store,
            clock: Clock::system(),
            workers,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Vet every supported file under `import_root` and record a vetting
    /// run in the store.
    pub async fn vet(
        &self,
        import_root: &Path,
        threshold: f64,
        cancel: CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<VettingReport> {
        let started = Instant::now();

        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::user(format!(
                "similarity threshold must be in [0, 1], got {threshold}"
            )));
        }
        if !import_root.is_dir() {
            return Err(Error::user(format!(
                "not a readable directory: {}",
                import_root.display()
            )));
        }
        let root = import_root
            .canonicalize()
            .map_err(|e| Error::user(format!("cannot resolve {}: {e}", import_root.display())))?;

        let files = collect_audio_files(&root);

        if let Some(cb) = &progress {
            cb(ProgressEvent::Started {
                total_files: files.len(),
            });
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<WorkerMsg>(CHANNEL_CAPACITY);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::Internal(format!("worker pool: {e}")))?;

        let producer = {
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                pool.install(|| {
                    files.par_iter().for_each(|path| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let _ = tx.blocking_send(read_candidate(path));
                    });
                });
            })
        };

        let mut report = VettingReport {
            import_path: root.to_string_lossy().to_string(),
            threshold,
            ..Default::default()
        };

        while let Some(msg) = rx.recv().await {
            let done_path = match msg {
                WorkerMsg::Candidate(candidate) => {
                    let path = candidate.path.to_string_lossy().to_string();
                    report.total_files += 1;

                    match self.checker.check(&candidate, threshold).await? {
                        MatchResult::Duplicate {
                            matched,
                            confidence,
                            matched_by,
                        } => report.duplicates.push(VetEntry {
                            path: path.clone(),
                            matched: Some(matched),
                            confidence: Some(confidence),
                            matched_by: Some(matched_by),
                        }),
                        MatchResult::Fuzzy { matched, confidence } => {
                            let entry = VetEntry {
                                path: path.clone(),
                                matched: Some(matched),
                                confidence: Some(confidence),
                                matched_by: Some(MatchedBy::Fuzzy),
                            };
                            if confidence >= CERTAIN_CONFIDENCE {
                                report.duplicates.push(entry);
                            } else {
                                report.uncertain.push(entry);
                            }
                        }
                        MatchResult::New => report.new.push(VetEntry {
                            path: path.clone(),
                            matched: None,
                            confidence: None,
                            matched_by: None,
                        }),
                    }
                    path
                }
                WorkerMsg::Failed { path, message } => {
                    tracing::debug!("cannot vet {path}: {message}");
                    report.total_files += 1;
                    report.errors.push(ScanFailure {
                        path: path.clone(),
                        message,
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
            .map_err(|e| Error::Internal(format!("vet worker panicked: {e}")))?;

        report.cancelled = cancel.is_cancelled();
        report.duration = started.elapsed();

        self.store
            .record_vetting_run(
                &report.import_path,
                report.total_files as i64,
                report.duplicates.len() as i64,
                report.new.len() as i64,
                report.uncertain.len() as i64,
                threshold,
                self.clock.now(),
            )
            .await?;

        tracing::info!(
            total = report.total_files,
            duplicates = report.duplicates.len(),
            new = report.new.len(),
            uncertain = report.uncertain.len(),
            "vetting of {} finished",
            report.import_path
        );

        Ok(report)
    }
}

/// Reader + hasher pass over one import file
fn read_candidate(path: &Path) -> WorkerMsg {
    let path_str = path.to_string_lossy().to_string();

    let props = match reader::read(path) {
        Ok(props) => props,
        Err(e) => {
            return WorkerMsg::Failed {
                path: path_str,
                message: e.to_string(),
            }
        }
    };

    let file_hash = match content_hash(path) {
        Ok(hash) => hash,
        Err(e) => {
            return WorkerMsg::Failed {
                path: path_str,
                message: e.to_string(),
            }
        }
    };

    WorkerMsg::Candidate(Box::new(Candidate {
        path: path.to_path_buf(),
        metadata_hash: metadata_hash(props.artist.as_deref(), props.title.as_deref()),
        content_hash: file_hash,
        artist: props.artist,
        title: props.title,
    }))
}

impl VettingReport {
    /// Write one candidate path per line, LF-terminated UTF-8.
    pub fn export_new(&self, dest: &Path) -> std::io::Result<()> {
        write_lines(dest, self.new.iter().map(|e| e.path.clone()))
    }

    /// Duplicate lines carry the match: `path → match_path (confidence%)`.
    pub fn export_duplicates(&self, dest: &Path) -> std::io::Result<()> {
        write_lines(dest, self.duplicates.iter().map(entry_with_match))
    }

    pub fn export_uncertain(&self, dest: &Path) -> std::io::Result<()> {
        write_lines(dest, self.uncertain.iter().map(entry_with_match))
    }
}

fn entry_with_match(entry: &VetEntry) -> String {
    match (&entry.matched, entry.confidence) {
        (Some(matched), Some(confidence)) => format!(
            "{} → {} ({:.0}%)",
            entry.path,
            matched.path,
            confidence * 100.0
        ),
        _ => entry.path.clone(),
    }
}

fn write_lines(dest: &Path, lines: impl Iterator<Item = String>) -> std::io::Result<()> {
    use std::io::Write;

    let mut out = std::io::BufWriter::new(std::fs::File::create(dest)?);
    for line in lines {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
