//! Opaque identifiers for deletion sessions and groups

use rand::RngCore;

/// Generate a 16-hex-character opaque identifier.
///
/// Used for deletion session ids and group ids, which name backup
/// subdirectories and key the dedup audit trail.
pub fn opaque_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
