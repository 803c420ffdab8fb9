//! Deterministic quality scoring
//!
//! Maps audio-format properties to a 0–100 score used to rank duplicates.
//! Inputs are a properties record, the file's mtime, and an injected "now",
//! so the same file always scores the same in tests.

use std::cmp::Reverse;

use crate::models::AudioProperties;

const SECONDS_PER_DAY: i64 = 86_400;
const MAX_LOSSY_BITRATE: u32 = 320;

/// Score one file. Components are summed and clamped to [0, 100].
pub fn quality_score(props: &AudioProperties, file_mtime: i64, now: i64) -> u8 {
    let mut score = format_points(&props.format)
        + bitrate_points(props)
        + sample_rate_points(props.sample_rate_hz)
        + recency_points(file_mtime, now);

    if props.bitrate_mode == crate::models::BitrateMode::Vbr {
        score += 2;
    }

    score.clamp(0, 100) as u8
}

/// Sort key for ranking files of the same recording: higher score first,
/// then larger file, then earlier mtime.
pub fn rank_key(quality_score: u8, size: i64, file_mtime: i64) -> (u8, i64, Reverse<i64>) {
    (quality_score, size, Reverse(file_mtime))
}

/// 0–40 depending on container
fn format_points(format: &str) -> i64 {
    match format {
        "flac" | "alac" => 40,
        "wav" | "aiff" => 38,
        "ape" | "wv" | "tta" => 37,
        "dsd" | "dsf" => 36,
        "aac" | "m4a" => 22,
        "mp3" => 20,
        "ogg" | "opus" => 18,
        "wma" => 15,
        _ => 10,
    }
}

/// 0–30; lossless always earns the full component
fn bitrate_points(props: &AudioProperties) -> i64 {
    if props.is_lossless() {
        return 30;
    }
    match props.bitrate_kbps {
        Some(kbps) => {
            let capped = kbps.min(MAX_LOSSY_BITRATE) as f64;
            (30.0 * capped / MAX_LOSSY_BITRATE as f64).round() as i64
        }
        None => 0,
    }
}

/// 0–20
fn sample_rate_points(sample_rate_hz: Option<u32>) -> i64 {
    match sample_rate_hz {
        Some(sr) if sr >= 96_000 => 20,
        Some(sr) if sr >= 48_000 => 15,
        Some(sr) if sr >= 44_100 => 10,
        Some(_) => 5,
        None => 0,
    }
}

/// 0–10; younger files score higher
fn recency_points(file_mtime: i64, now: i64) -> i64 {
    let age_days = (now - file_mtime) / SECONDS_PER_DAY;
    if age_days < 365 {
        10
    } else if age_days < 1825 {
        5
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BitrateMode;

    const NOW: i64 = 1_750_000_000;

    fn flac_hires() -> AudioProperties {
        AudioProperties {
            format: "flac".into(),
            sample_rate_hz: Some(96_000),
            bit_depth: Some(24),
            ..Default::default()
        }
    }

    fn mp3_128() -> AudioProperties {
        AudioProperties {
            format: "mp3".into(),
            bitrate_kbps: Some(128),
            sample_rate_hz: Some(44_100),
            ..Default::default()
        }
    }

    #[test]
    fn component_sums_match_the_table() {
        // fresh FLAC 96k: 40 format + 30 lossless + 20 rate + 10 recency
        assert_eq!(quality_score(&flac_hires(), NOW, NOW), 100);

        // old MP3 128: 20 + round(30*128/320)=12 + 10 + 0
        let old = NOW - 2000 * SECONDS_PER_DAY;
        assert_eq!(quality_score(&mp3_128(), old, NOW), 42);

        // mid-age (1 year < age < 5 years) earns 5
        let mid = NOW - 400 * SECONDS_PER_DAY;
        assert_eq!(quality_score(&mp3_128(), mid, NOW), 47);
    }

    #[test]
    fn lossless_beats_low_bitrate_lossy() {
        let old = NOW - 3000 * SECONDS_PER_DAY;
        assert!(quality_score(&flac_hires(), old, NOW) > quality_score(&mp3_128(), NOW, NOW));
    }

    #[test]
    fn bitrate_is_capped_at_320() {
        let mut props = mp3_128();
        props.bitrate_kbps = Some(512);
        let capped = quality_score(&props, NOW, NOW);
        props.bitrate_kbps = Some(320);
        assert_eq!(quality_score(&props, NOW, NOW), capped);
    }

    #[test]
    fn vbr_bonus_applies_after_other_components() {
        let mut props = mp3_128();
        let base = quality_score(&props, NOW, NOW);
        props.bitrate_mode = BitrateMode::Vbr;
        assert_eq!(quality_score(&props, NOW, NOW), base + 2);
    }

    #[test]
    fn score_is_clamped_to_100() {
        let mut props = flac_hires();
        // lossless never carries the VBR flag in practice; the clamp still holds
        props.bitrate_mode = BitrateMode::Vbr;
        assert_eq!(quality_score(&props, NOW, NOW), 100);
    }

    #[test]
    fn unknown_properties_score_zero_components() {
        let props = AudioProperties {
            format: "mp3".into(),
            ..Default::default()
        };
        let old = NOW - 3000 * SECONDS_PER_DAY;
        // format only
        assert_eq!(quality_score(&props, old, NOW), 20);
    }

    #[test]
    fn rank_prefers_score_then_size_then_earlier_mtime() {
        assert!(rank_key(80, 10, 5) > rank_key(70, 99, 1));
        assert!(rank_key(80, 20, 5) > rank_key(80, 10, 1));
        assert!(rank_key(80, 10, 1) > rank_key(80, 10, 5));
    }
}
