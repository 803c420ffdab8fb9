//! Audio metadata reader
//!
//! Extracts tags and stream properties from audio containers using lofty.
//! The reader never mutates files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use lofty::{Accessor, AudioFile, ItemKey, Probe, TaggedFileExt};

use crate::error::FileError;
use crate::models::{AudioProperties, BitrateMode};
use crate::utils::filesystem::SUPPORTED_EXTENSIONS;

/// How much of an MP3 head is scanned for VBR markers
const MODE_SCAN_BYTES: usize = 64 * 1024;

/// Read tags and stream properties from one file.
///
/// Errors: `UnsupportedFormat` when the extension is not in the supported
/// set, `CorruptFile` when the container cannot be parsed, `Io` on read
/// failure.
pub fn read(path: &Path) -> Result<AudioProperties, FileError> {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    if !SUPPORTED_EXTENSIONS.contains(&format.as_str()) {
        return Err(FileError::UnsupportedFormat(format));
    }

    let tagged_file = Probe::open(path)
        .map_err(|e| classify(path, e))?
        .read()
        .map_err(|e| classify(path, e))?;

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let artist = tag.and_then(|t| t.artist().map(|s| s.to_string()));
    let title = tag.and_then(|t| t.title().map(|s| s.to_string()));
    let album = tag.and_then(|t| t.album().map(|s| s.to_string()));

    // full date strings like "2013-04-19" need the leading four digits;
    // lofty's year() doesn't parse those from TDRC/DATE tags
    let year: Option<i32> = tag.and_then(|t| {
        let date_keys = [
            ItemKey::RecordingDate,
            ItemKey::OriginalReleaseDate,
            ItemKey::Year,
        ];

        for key in date_keys {
            if let Some(date_str) = t.get_string(&key) {
                let s = date_str.trim();
                if s.len() >= 4 && s[..4].chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(y) = s[..4].parse::<i32>() {
                        return Some(y);
                    }
                }
            }
        }

        t.year().map(|y| y as i32)
    });

    let properties = tagged_file.properties();
    let duration_secs = properties.duration().as_secs_f64();
    let bitrate_kbps = properties.audio_bitrate();
    let sample_rate_hz = properties.sample_rate();
    let channels = properties.channels().unwrap_or(2);

    let mut props = AudioProperties {
        format,
        artist: non_empty(artist),
        title: non_empty(title),
        album: non_empty(album),
        year,
        duration_secs,
        bitrate_kbps,
        sample_rate_hz,
        bit_depth: None,
        channels,
        bitrate_mode: BitrateMode::Unknown,
    };

    // bit depth is only meaningful for lossless containers
    if props.is_lossless() {
        props.bit_depth = properties.bit_depth();
    }
    props.bitrate_mode = detect_bitrate_mode(path, &props);

    Ok(props)
}

/// Empty or whitespace-only tags become absent
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn classify(path: &Path, err: lofty::error::LoftyError) -> FileError {
    match err.kind() {
        lofty::error::ErrorKind::Io(io_err) => {
            FileError::Io(std::io::Error::new(io_err.kind(), err.to_string()))
        }
        _ => FileError::CorruptFile {
            path: path.to_path_buf(),
            detail: err.to_string(),
        },
    }
}

/// Best-effort bitrate-mode detection.
///
/// Lossless containers are left UNKNOWN (their "bitrate" is a property of
/// the content, not an encoder choice). Vorbis and Opus streams are VBR by
/// construction. MP3 heads are scanned for the Xing/VBRI headers VBR
/// encoders write, or the LAME "Info" marker that tags a CBR stream.
fn detect_bitrate_mode(path: &Path, props: &AudioProperties) -> BitrateMode {
    if props.is_lossless() {
        return BitrateMode::Unknown;
    }

    match props.format.as_str() {
        "ogg" | "opus" => BitrateMode::Vbr,
        "mp3" => scan_mp3_head(path).unwrap_or(BitrateMode::Unknown),
        _ => BitrateMode::Unknown,
    }
}

fn scan_mp3_head(path: &Path) -> std::io::Result<BitrateMode> {
    let mut head = vec![0u8; MODE_SCAN_BYTES];
    let mut file = File::open(path)?;
    let n = read_up_to(&mut file, &mut head)?;
    head.truncate(n);

    if contains(&head, b"Xing") || contains(&head, b"VBRI") {
        Ok(BitrateMode::Vbr)
    } else if contains(&head, b"Info") {
        Ok(BitrateMode::Cbr)
    } else {
        Ok(BitrateMode::Unknown)
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
