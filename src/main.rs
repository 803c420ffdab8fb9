//! music-tools CLI - index, vet, verify, stats, history, upgrades
//!
//! Thin shell over the core operations. All rendering (progress bars,
//! summaries, exports) happens here; the core emits events and reports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use music_tools::config::Paths;
use music_tools::core::{Indexer, ScanOptions, UpgradeScout, Vetter};
use music_tools::db::Store;
use music_tools::models::{ProgressEvent, ProgressFn, ScanReport, VettingReport};
use music_tools::utils::CancelToken;
use music_tools::Error;

const EXIT_OK: i32 = 0;
const EXIT_USER: i32 = 2;
const EXIT_INTEGRITY: i32 = 3;
const EXIT_PARTIAL: i32 = 4;
const EXIT_CANCELLED: i32 = 130;

/// Local music library curation
#[derive(Parser, Debug)]
#[command(name = "music-tools")]
#[command(version = "0.3.0")]
#[command(about = "Index your music collection, vet import batches, and deduplicate safely")]
struct Cli {
    /// Data directory (default: $MUSIC_TOOLS_HOME or ~/.music-tools)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a library directory into the index
    Index {
        root: PathBuf,
        /// Re-process files even when mtime and size are unchanged
        #[arg(long)]
        rescan: bool,
    },
    /// Classify an import directory against the index
    Vet {
        import_root: PathBuf,
        /// Fuzzy similarity threshold in [0, 1]
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,
        /// Write new candidate paths to this file
        #[arg(long)]
        export_new: Option<PathBuf>,
        /// Write duplicate candidate paths to this file
        #[arg(long)]
        export_dupes: Option<PathBuf>,
        /// Write uncertain candidate paths to this file
        #[arg(long)]
        export_uncertain: Option<PathBuf>,
    },
    /// Re-scan a library root and deactivate files missing from disk
    Verify { root: PathBuf },
    /// Show the latest library statistics
    Stats,
    /// Show recent vetting runs
    History {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Suggest lossless upgrades for low-quality library files
    Upgrades {
        /// Minimum quality-score gain worth suggesting
        #[arg(long, default_value_t = 10)]
        min_gain: u8,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{log_level},lofty=error,sqlx=warn"
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            e.downcast_ref::<Error>().map(exit_code_for).unwrap_or(1)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let paths = Paths::resolve(cli.data_dir)?;
    let store = Arc::new(Store::open(&paths.db_path()).await?);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("cancellation requested, finishing accepted work...");
                cancel.cancel();
            }
        });
    }

    let code = match cli.command {
        Command::Index { root, rescan } => {
            let (bar, progress) = scan_progress();
            let report = Indexer::new(Arc::clone(&store))
                .scan(
                    &root,
                    ScanOptions {
                        rescan,
                        sweep_missing: false,
                    },
                    cancel.clone(),
                    Some(progress),
                )
                .await?;
            bar.finish_and_clear();
            print_scan_report(&report);
            scan_exit_code(&report)
        }
        Command::Verify { root } => {
            let (bar, progress) = scan_progress();
            let report = Indexer::new(Arc::clone(&store))
                .scan(
                    &root,
                    ScanOptions {
                        rescan: false,
                        sweep_missing: true,
                    },
                    cancel.clone(),
                    Some(progress),
                )
                .await?;
            bar.finish_and_clear();
            print_scan_report(&report);
            scan_exit_code(&report)
        }
        Command::Vet {
            import_root,
            threshold,
            export_new,
            export_dupes,
            export_uncertain,
        } => {
            let (bar, progress) = scan_progress();
            let report = Vetter::new(Arc::clone(&store))
                .vet(&import_root, threshold, cancel.clone(), Some(progress))
                .await?;
            bar.finish_and_clear();
            print_vetting_report(&report);

            if let Some(dest) = export_new {
                report
                    .export_new(&dest)
                    .with_context(|| format!("cannot write {}", dest.display()))?;
                println!("wrote {} new paths to {}", report.new.len(), dest.display());
            }
            if let Some(dest) = export_dupes {
                report
                    .export_duplicates(&dest)
                    .with_context(|| format!("cannot write {}", dest.display()))?;
                println!(
                    "wrote {} duplicate paths to {}",
                    report.duplicates.len(),
                    dest.display()
                );
            }
            if let Some(dest) = export_uncertain {
                report
                    .export_uncertain(&dest)
                    .with_context(|| format!("cannot write {}", dest.display()))?;
                println!(
                    "wrote {} uncertain paths to {}",
                    report.uncertain.len(),
                    dest.display()
                );
            }

            if report.cancelled {
                EXIT_CANCELLED
            } else if report.errors.is_empty() {
                EXIT_OK
            } else {
                EXIT_PARTIAL
            }
        }
        Command::Stats => {
            match store.latest_statistics().await? {
                Some(stats) => {
                    println!("files:          {}", stats.total_files);
                    println!("size:           {:.1} GiB", stats.total_bytes as f64 / 1024.0 / 1024.0 / 1024.0);
                    println!("artists:        {}", stats.unique_artists);
                    println!("albums:         {}", stats.unique_albums);
                    let mut formats: Vec<_> = stats.format_counts.iter().collect();
                    formats.sort_by(|a, b| b.1.cmp(a.1));
                    for (format, count) in formats {
                        println!("  {format:<6} {count}");
                    }
                    println!(
                        "last scan:      {} ({:.1}s)",
                        stats.scanned_at, stats.scan_duration_secs
                    );
                }
                None => println!("no scans recorded yet"),
            }
            EXIT_OK
        }
        Command::History { limit } => {
            let runs = store.list_vetting_history(limit).await?;
            if runs.is_empty() {
                println!("no vetting runs recorded yet");
            }
            for run in runs {
                println!(
                    "{}  {}  total={} dup={} new={} uncertain={} threshold={:.2}",
                    run.completed_at,
                    run.import_path,
                    run.total_files,
                    run.duplicates,
                    run.new_files,
                    run.uncertain,
                    run.threshold
                );
            }
            EXIT_OK
        }
        Command::Upgrades { min_gain } => {
            let candidates = UpgradeScout::new(Arc::clone(&store)).suggest(min_gain).await?;
            if candidates.is_empty() {
                println!("no upgrade candidates");
            }
            for candidate in candidates {
                println!(
                    "priority {:>3}  gain {:>3}  {} {} -> {}  (file #{}, action: {})",
                    candidate.priority_score,
                    candidate.potential_quality_gain,
                    candidate.current_format,
                    candidate
                        .current_bitrate_kbps
                        .map(|b| format!("{b}kbps"))
                        .unwrap_or_default(),
                    candidate.recommended_format,
                    candidate.library_file_id,
                    candidate.user_action.as_str()
                );
            }
            EXIT_OK
        }
    };

    store.close().await;
    Ok(code)
}

fn scan_progress() -> (ProgressBar, ProgressFn) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7}")
            .unwrap()
            .progress_chars("##-"),
    );

    let cb_bar = bar.clone();
    let callback: ProgressFn = Arc::new(move |event| match event {
        ProgressEvent::Started { total_files } => cb_bar.set_length(total_files as u64),
        ProgressEvent::FileDone { .. } => cb_bar.inc(1),
    });

    (bar, callback)
}

fn print_scan_report(report: &ScanReport) {
    println!(
        "added={} updated={} skipped={} errored={} deactivated={} in {:.1}s",
        report.added,
        report.updated,
        report.skipped,
        report.errored,
        report.deactivated,
        report.duration.as_secs_f64()
    );
    for failure in &report.errors {
        println!("  error: {}: {}", failure.path, failure.message);
    }
    if report.cancelled {
        println!("scan cancelled; accepted work was committed");
    }
}

fn print_vetting_report(report: &VettingReport) {
    println!(
        "{} files: {} new, {} duplicates, {} uncertain (threshold {:.2})",
        report.total_files,
        report.new.len(),
        report.duplicates.len(),
        report.uncertain.len(),
        report.threshold
    );
    for entry in &report.uncertain {
        if let (Some(matched), Some(confidence)) = (&entry.matched, entry.confidence) {
            println!(
                "  uncertain: {} → {} ({:.0}%)",
                entry.path,
                matched.path,
                confidence * 100.0
            );
        }
    }
    for failure in &report.errors {
        println!("  error: {}: {}", failure.path, failure.message);
    }
}

fn scan_exit_code(report: &ScanReport) -> i32 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.errored > 0 {
        EXIT_PARTIAL
    } else {
        EXIT_OK
    }
}

fn exit_code_for(err: &Error) -> i32 {
    match err.kind() {
        "user" | "validation" => EXIT_USER,
        "integrity" | "store" | "internal" => EXIT_INTEGRITY,
        "file" => EXIT_PARTIAL,
        _ => 1,
    }
}
