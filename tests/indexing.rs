//! End-to-end indexing scenarios

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use music_tools::core::{Indexer, ScanOptions};
use music_tools::utils::CancelToken;

use common::{memory_store, write_wav};

fn lib_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

#[tokio::test]
async fn fresh_index_adds_every_file() {
    let (_dir, root) = lib_dir();
    write_wav(
        &root.join("a.wav"),
        44_100,
        1,
        1,
        "Daft Punk",
        "Get Lucky",
        Some("Random Access Memories"),
    );
    write_wav(
        &root.join("b.wav"),
        44_100,
        1,
        2,
        "Calvin Harris",
        "Summer",
        None,
    );

    let store = memory_store().await;
    let indexer = Indexer::new(Arc::clone(&store));
    let report = indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.errored, 0);
    assert_eq!(report.statistics.total_files, 2);
    assert_eq!(report.statistics.unique_artists, 2);
    assert_eq!(report.statistics.format_counts.get("wav"), Some(&2));
    assert_eq!(store.count_active().await.unwrap(), 2);

    let row = store
        .get_by_path(&root.join("a.wav").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.artist.as_deref(), Some("Daft Punk"));
    assert_eq!(row.title.as_deref(), Some("Get Lucky"));
    assert_eq!(row.format, "wav");
    assert!(row.is_lossless);
    assert_eq!(row.metadata_hash.len(), 32);
    assert_eq!(row.content_hash.len(), 32);
    assert!(row.quality_score > 0);
}

#[tokio::test]
async fn incremental_reindex_skips_unchanged_files() {
    let (_dir, root) = lib_dir();
    write_wav(&root.join("a.wav"), 44_100, 1, 1, "Daft Punk", "Get Lucky", None);
    write_wav(&root.join("b.wav"), 44_100, 1, 2, "Calvin Harris", "Summer", None);

    let store = memory_store().await;
    let indexer = Indexer::new(Arc::clone(&store));
    indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    write_wav(
        &root.join("c.wav"),
        44_100,
        1,
        3,
        "Daft Punk",
        "One More Time",
        None,
    );

    let second = indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(second.added, 1);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn indexing_twice_is_idempotent() {
    let (_dir, root) = lib_dir();
    write_wav(&root.join("a.wav"), 44_100, 1, 1, "Daft Punk", "Get Lucky", None);

    let store = memory_store().await;
    let indexer = Indexer::new(Arc::clone(&store));
    indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    let again = indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(again.added, 0);
    assert_eq!(again.updated, 0);
    assert_eq!(again.skipped, 1);

    let stats = store.latest_statistics().await.unwrap().unwrap();
    assert_eq!(stats.total_files, 1);
}

#[tokio::test]
async fn touching_mtime_updates_the_row_but_not_the_hashes() {
    let (_dir, root) = lib_dir();
    let path = root.join("a.wav");
    write_wav(&path, 44_100, 1, 1, "Daft Punk", "Get Lucky", None);

    let store = memory_store().await;
    let indexer = Indexer::new(Arc::clone(&store));
    indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    let before = store
        .get_by_path(&path.to_string_lossy())
        .await
        .unwrap()
        .unwrap();

    // push mtime into the future so the skip check sees a change
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(3600))
        .unwrap();
    drop(file);

    let report = indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();
    assert_eq!(report.updated, 1);

    let after = store
        .get_by_path(&path.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.metadata_hash, before.metadata_hash);
    assert_eq!(after.content_hash, before.content_hash);
    assert_ne!(after.file_mtime, before.file_mtime);
}

#[tokio::test]
async fn verify_deactivates_missing_files_and_reindex_restores_them() {
    let (_dir, root) = lib_dir();
    let keeper = root.join("keeper.wav");
    let doomed = root.join("doomed.wav");
    write_wav(&keeper, 44_100, 1, 1, "Daft Punk", "Get Lucky", None);
    write_wav(&doomed, 44_100, 1, 2, "Daft Punk", "Contact", None);

    let store = memory_store().await;
    let indexer = Indexer::new(Arc::clone(&store));
    indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    std::fs::remove_file(&doomed).unwrap();

    let verify_opts = ScanOptions {
        rescan: false,
        sweep_missing: true,
    };
    let report = indexer
        .scan(&root, verify_opts, CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.deactivated, 1);
    assert_eq!(store.count_active().await.unwrap(), 1);

    // the record survives for history
    let row = store
        .get_by_path(&doomed.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert!(!row.is_active);

    // the file comes back; a plain index reactivates it
    write_wav(&doomed, 44_100, 1, 2, "Daft Punk", "Contact", None);
    indexer
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    let row = store
        .get_by_path(&doomed.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert!(row.is_active);
    assert_eq!(store.count_active().await.unwrap(), 2);
}

#[tokio::test]
async fn unreadable_files_are_counted_not_fatal() {
    let (_dir, root) = lib_dir();
    write_wav(&root.join("good.wav"), 44_100, 1, 1, "Daft Punk", "Get Lucky", None);
    std::fs::write(root.join("broken.wav"), b"not a riff chunk at all").unwrap();

    let store = memory_store().await;
    let report = Indexer::new(Arc::clone(&store))
        .scan(&root, ScanOptions::default(), CancelToken::new(), None)
        .await
        .unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.errored, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].path.ends_with("broken.wav"));
}

#[tokio::test]
async fn missing_root_is_a_user_error() {
    let store = memory_store().await;
    let err = Indexer::new(store)
        .scan(
            std::path::Path::new("/definitely/not/here"),
            ScanOptions::default(),
            CancelToken::new(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "user");
}
