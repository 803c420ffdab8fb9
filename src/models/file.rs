//! Library file and audio property models

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::enums::BitrateMode;

/// Formats whose container carries uncompressed or losslessly-compressed audio
pub const LOSSLESS_FORMATS: &[&str] = &[
    "flac", "wav", "aiff", "alac", "ape", "wv", "tta", "dsd", "dsf",
];

/// Sample rates above CD-adjacent rates, or bit depths above 16, count as hi-res
const HIRES_SAMPLE_RATE: u32 = 48_000;
const HIRES_BIT_DEPTH: u8 = 16;

/// Stream properties and tags extracted from one audio container.
///
/// Text fields are trimmed; empty tags become `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioProperties {
    /// Lowercased extension without the dot
    pub format: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub duration_secs: f64,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    /// Only meaningful for lossless formats
    pub bit_depth: Option<u8>,
    pub channels: u8,
    pub bitrate_mode: BitrateMode,
}

impl AudioProperties {
    pub fn is_lossless(&self) -> bool {
        LOSSLESS_FORMATS.contains(&self.format.as_str())
    }

    pub fn is_hires(&self) -> bool {
        self.sample_rate_hz.map_or(false, |sr| sr > HIRES_SAMPLE_RATE)
            || self.bit_depth.map_or(false, |bd| bd > HIRES_BIT_DEPTH)
    }
}

/// One indexed audio file. The persistent unit of the library index.
///
/// Rows are never physically deleted; a file that disappears from disk is
/// flipped to `is_active = false` and retained for history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryFile {
    /// 0 until assigned by the store
    pub id: i64,
    /// Absolute path, unique across the index
    pub path: String,
    pub filename: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub duration_secs: f64,
    pub format: String,
    pub size: i64,
    /// MD5 over `lower(artist)|lower(title)`, 32-char lowercase hex
    pub metadata_hash: String,
    /// MD5 over the first and last 64 KiB, 32-char lowercase hex
    pub content_hash: String,
    pub quality_score: u8,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub bit_depth: Option<u8>,
    pub channels: u8,
    pub bitrate_mode: BitrateMode,
    pub is_lossless: bool,
    pub is_hires: bool,
    /// Unix seconds
    pub indexed_at: i64,
    /// Unix seconds
    pub file_mtime: i64,
    pub last_verified: Option<i64>,
    pub is_active: bool,
}

impl LibraryFile {
    /// Build a record from a metadata pass over one file on disk.
    #[allow(clippy::too_many_arguments)]
    pub fn from_scan(
        path: &Path,
        props: AudioProperties,
        size: i64,
        file_mtime: i64,
        metadata_hash: String,
        content_hash: String,
        quality_score: u8,
        indexed_at: i64,
    ) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let is_lossless = props.is_lossless();
        let is_hires = props.is_hires();

        LibraryFile {
            id: 0,
            path: path.to_string_lossy().to_string(),
            filename,
            artist: props.artist,
            title: props.title,
            album: props.album,
            year: props.year,
            duration_secs: props.duration_secs,
            format: props.format,
            size,
            metadata_hash,
            content_hash,
            quality_score,
            bitrate_kbps: props.bitrate_kbps,
            sample_rate_hz: props.sample_rate_hz,
            bit_depth: props.bit_depth,
            channels: props.channels,
            bitrate_mode: props.bitrate_mode,
            is_lossless,
            is_hires,
            indexed_at,
            file_mtime,
            last_verified: None,
            is_active: true,
        }
    }
}
