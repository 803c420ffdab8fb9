//! File fingerprints
//!
//! Two MD5 fingerprints per file: a metadata hash that catches the same song
//! across different encodes, and a partial-content hash that catches
//! byte-identical copies without digesting hundreds of megabytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use md5::{Digest, Md5};

/// Bytes hashed from each end of the file
const CHUNK_SIZE: usize = 64 * 1024;

/// Hash of `lower(trim(artist)) || "|" || lower(trim(title))`.
///
/// Absent fields are substituted by the empty string, so an untagged file
/// still gets a stable (if uninformative) fingerprint. Returns 32-char
/// lowercase hex.
pub fn metadata_hash(artist: Option<&str>, title: Option<&str>) -> String {
    let artist = artist.unwrap_or("").trim().to_lowercase();
    let title = title.unwrap_or("").trim().to_lowercase();

    let mut hasher = Md5::new();
    hasher.update(artist.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the first and last 64 KiB of the file, or the whole file when it
/// is 128 KiB or smaller. Returns 32-char lowercase hex.
///
/// Changing mtime alone never changes this hash.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut hasher = Md5::new();

    if len <= (2 * CHUNK_SIZE) as u64 {
        let mut buf = Vec::with_capacity(len as usize);
        file.read_to_end(&mut buf)?;
        hasher.update(&buf);
    } else {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        file.read_exact(&mut chunk)?;
        hasher.update(&chunk);

        file.seek(SeekFrom::End(-(CHUNK_SIZE as i64)))?;
        file.read_exact(&mut chunk)?;
        hasher.update(&chunk);
    }

    Ok(hex::encode(hasher.finalize()))
}
