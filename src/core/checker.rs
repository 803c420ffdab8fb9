//! Three-tier duplicate checker
//!
//! Candidates are matched against the library in order of certainty: exact
//! content hash, exact metadata hash, then fuzzy title similarity within the
//! same artist. The first tier that hits wins.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::similarity::{gestalt_ratio, normalize_title};
use crate::db::Store;
use crate::error::{Error, Result};
use crate::models::{LibraryFile, MatchedBy};

/// One import file, read and hashed, ready for matching
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub metadata_hash: String,
    pub content_hash: String,
}

/// Outcome of checking one candidate
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// An exact tier hit; confidence is always 1.0
    Duplicate {
        matched: LibraryFile,
        confidence: f64,
        matched_by: MatchedBy,
    },
    /// A fuzzy title match at or above the threshold
    Fuzzy { matched: LibraryFile, confidence: f64 },
    New,
}

pub struct DuplicateChecker {
    store: Arc<Store>,
}

impl DuplicateChecker {
    pub fn new(store: Arc<Store>) -> Self {
        DuplicateChecker { store }
    }

    /// Classify one candidate against the active library.
    ///
    /// An absent artist or title disables the tiers that require it; it
    /// never raises.
    pub async fn check(&self, candidate: &Candidate, threshold: f64) -> Result<MatchResult> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::user(format!(
                "similarity threshold must be in [0, 1], got {threshold}"
            )));
        }

        // tier 1: byte-identical content
        let hits = self
            .store
            .lookup_by_content_hash(&candidate.content_hash)
            .await?;
        if let Some(matched) = best_of(hits) {
            return Ok(MatchResult::Duplicate {
                matched,
                confidence: 1.0,
                matched_by: MatchedBy::ContentHash,
            });
        }

        let artist = trimmed(candidate.artist.as_deref());
        let title = trimmed(candidate.title.as_deref());

        // tier 2: same artist|title fingerprint, only meaningful when both
        // tags are present
        if artist.is_some() && title.is_some() {
            let hits = self
                .store
                .lookup_by_metadata_hash(&candidate.metadata_hash)
                .await?;
            if let Some(matched) = best_of(hits) {
                return Ok(MatchResult::Duplicate {
                    matched,
                    confidence: 1.0,
                    matched_by: MatchedBy::MetadataHash,
                });
            }
        }

        // tier 3: fuzzy titles within the same artist
        if let Some(artist) = artist {
            let candidates = self.store.find_by_artist(&artist.to_lowercase()).await?;
            let normalized = normalize_title(title.unwrap_or(""));

            let mut best: Option<(f64, LibraryFile)> = None;
            for lib_file in candidates {
                let Some(lib_title) = lib_file.title.as_deref() else {
                    continue;
                };
                let score = gestalt_ratio(&normalized, &normalize_title(lib_title));

                let better = match &best {
                    None => true,
                    Some((best_score, best_file)) => {
                        score > *best_score
                            || (score == *best_score
                                && strength_key(&lib_file) > strength_key(best_file))
                    }
                };
                if better {
                    best = Some((score, lib_file));
                }
            }

            if let Some((confidence, matched)) = best {
                if confidence >= threshold {
                    return Ok(MatchResult::Fuzzy {
                        matched,
                        confidence,
                    });
                }
            }
        }

        Ok(MatchResult::New)
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Selection key shared by every tier: highest quality score wins, then
/// larger file, then lower id.
fn strength_key(file: &LibraryFile) -> (u8, i64, std::cmp::Reverse<i64>) {
    (file.quality_score, file.size, std::cmp::Reverse(file.id))
}

/// When a tier returns several matches, keep the strongest copy
fn best_of(hits: Vec<LibraryFile>) -> Option<LibraryFile> {
    hits.into_iter()
        .max_by(|a, b| strength_key(a).cmp(&strength_key(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioProperties;
    use crate::utils::hashing::metadata_hash;
    use std::path::Path;

    fn lib_file(
        path: &str,
        artist: &str,
        title: &str,
        content_hash: &str,
        quality: u8,
    ) -> LibraryFile {
        let props = AudioProperties {
            format: "flac".into(),
            artist: Some(artist.into()),
            title: Some(title.into()),
            sample_rate_hz: Some(44_100),
            ..Default::default()
        };
        LibraryFile::from_scan(
            Path::new(path),
            props,
            1000,
            1,
            metadata_hash(Some(artist), Some(title)),
            content_hash.into(),
            quality,
            1_750_000_000,
        )
    }

    fn candidate(artist: Option<&str>, title: Option<&str>, content_hash: &str) -> Candidate {
        Candidate {
            path: PathBuf::from("/import/song.mp3"),
            artist: artist.map(String::from),
            title: title.map(String::from),
            metadata_hash: metadata_hash(artist, title),
            content_hash: content_hash.into(),
        }
    }

    async fn seeded_store() -> Arc<Store> {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store
            .upsert_file(&lib_file(
                "/lib/get_lucky.flac",
                "Daft Punk",
                "Get Lucky",
                &"a".repeat(32),
                95,
            ))
            .await
            .unwrap();
        store
            .upsert_file(&lib_file(
                "/lib/around.flac",
                "Daft Punk",
                "Around the World",
                &"b".repeat(32),
                90,
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn content_hash_wins_first() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        // same bytes, tags stripped entirely
        let result = checker
            .check(&candidate(None, None, &"a".repeat(32)), 0.8)
            .await
            .unwrap();

        match result {
            MatchResult::Duplicate {
                matched,
                confidence,
                matched_by,
            } => {
                assert_eq!(matched.path, "/lib/get_lucky.flac");
                assert_eq!(confidence, 1.0);
                assert_eq!(matched_by, MatchedBy::ContentHash);
            }
            other => panic!("expected content duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn metadata_hash_matches_different_encodes() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        let result = checker
            .check(
                &candidate(Some("Daft Punk"), Some("Get Lucky"), &"f".repeat(32)),
                0.8,
            )
            .await
            .unwrap();

        assert!(matches!(
            result,
            MatchResult::Duplicate {
                matched_by: MatchedBy::MetadataHash,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fuzzy_tier_matches_similar_titles() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        let result = checker
            .check(
                &candidate(
                    Some("Daft Punk"),
                    Some("Around the World Again"),
                    &"f".repeat(32),
                ),
                0.8,
            )
            .await
            .unwrap();

        match result {
            MatchResult::Fuzzy { matched, confidence } => {
                assert_eq!(matched.path, "/lib/around.flac");
                assert!((confidence - 0.8421052631578947).abs() < 1e-9);
            }
            other => panic!("expected fuzzy match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn below_threshold_is_new() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        // "veridis quo" vs library titles stays well under 0.8
        let result = checker
            .check(
                &candidate(Some("Daft Punk"), Some("Veridis Quo"), &"f".repeat(32)),
                0.8,
            )
            .await
            .unwrap();
        assert!(matches!(result, MatchResult::New));
    }

    #[tokio::test]
    async fn missing_artist_disables_metadata_and_fuzzy_tiers() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        let result = checker
            .check(&candidate(None, Some("Get Lucky"), &"f".repeat(32)), 0.8)
            .await
            .unwrap();
        assert!(matches!(result, MatchResult::New));
    }

    #[tokio::test]
    async fn unknown_artist_is_new() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        let result = checker
            .check(
                &candidate(Some("Calvin Harris"), Some("Get Lucky"), &"f".repeat(32)),
                0.8,
            )
            .await
            .unwrap();
        assert!(matches!(result, MatchResult::New));
    }

    #[tokio::test]
    async fn bad_threshold_is_a_user_error() {
        let store = seeded_store().await;
        let checker = DuplicateChecker::new(store);

        let err = checker
            .check(&candidate(None, None, &"a".repeat(32)), 1.5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "user");
    }

    #[tokio::test]
    async fn fuzzy_ties_resolve_to_lowest_id() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        // two copies of the same recording, equal similarity, quality, and
        // size; only their ids differ
        store
            .upsert_file(&lib_file(
                "/lib/first.flac",
                "Daft Punk",
                "Around the World",
                &"d".repeat(32),
                90,
            ))
            .await
            .unwrap();
        store
            .upsert_file(&lib_file(
                "/lib/second.flac",
                "Daft Punk",
                "Around the World",
                &"e".repeat(32),
                90,
            ))
            .await
            .unwrap();

        let checker = DuplicateChecker::new(store);
        let result = checker
            .check(
                &candidate(
                    Some("Daft Punk"),
                    Some("Around the World Again"),
                    &"f".repeat(32),
                ),
                0.8,
            )
            .await
            .unwrap();

        match result {
            MatchResult::Fuzzy { matched, .. } => assert_eq!(matched.path, "/lib/first.flac"),
            other => panic!("expected fuzzy match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ties_resolve_to_highest_quality() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store
            .upsert_file(&lib_file(
                "/lib/low.mp3",
                "Daft Punk",
                "Contact",
                &"c".repeat(32),
                40,
            ))
            .await
            .unwrap();
        store
            .upsert_file(&lib_file(
                "/lib/high.flac",
                "Daft Punk",
                "Contact",
                &"c".repeat(32),
                95,
            ))
            .await
            .unwrap();

        let checker = DuplicateChecker::new(store);
        let result = checker
            .check(&candidate(None, None, &"c".repeat(32)), 0.8)
            .await
            .unwrap();

        match result {
            MatchResult::Duplicate { matched, .. } => assert_eq!(matched.path, "/lib/high.flac"),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }
}
