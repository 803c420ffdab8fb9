//! Shared fixtures: minimal PCM WAV files tagged through lofty

use std::path::Path;
use std::sync::Arc;

use lofty::{Accessor, Tag, TagExt, TagType};

use music_tools::db::Store;

/// Write a valid 16-bit stereo PCM WAV with the given artist/title tags.
///
/// `seed` fills the sample data, so two files with different seeds have
/// different bytes (and different content hashes) while byte-copies stay
/// identical.
pub fn write_wav(
    path: &Path,
    sample_rate: u32,
    seconds: u32,
    seed: u8,
    artist: &str,
    title: &str,
    album: Option<&str>,
) {
    let channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let block_align: u16 = channels * bits_per_sample / 8;
    let byte_rate: u32 = sample_rate * block_align as u32;
    let data_len: u32 = byte_rate * seconds;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, seed);
    std::fs::write(path, bytes).unwrap();

    let mut tag = Tag::new(TagType::RiffInfo);
    tag.set_artist(artist.to_string());
    tag.set_title(title.to_string());
    if let Some(album) = album {
        tag.set_album(album.to_string());
    }
    tag.save_to_path(path).unwrap();
}

pub async fn memory_store() -> Arc<Store> {
    Arc::new(Store::open_in_memory().await.unwrap())
}
