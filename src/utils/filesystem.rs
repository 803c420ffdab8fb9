//! Filesystem traversal utilities

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Supported audio file extensions. Anything else is silently ignored.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "wav", "ogg", "opus"];

/// Check if a file has a supported audio extension (case-insensitive)
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Hidden entries (any name starting with '.') are skipped during scans
fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Check whether a symlinked entry resolves outside the scan root
fn symlink_escapes_root(entry: &DirEntry, root: &Path) -> bool {
    if !entry.path_is_symlink() {
        return false;
    }
    match entry.path().canonicalize() {
        Ok(resolved) => !resolved.starts_with(root),
        // broken link; drop it
        Err(_) => true,
    }
}

/// Enumerate every supported audio file under `root`.
///
/// `root` must already be canonicalized so the symlink-escape check compares
/// like with like. Hidden components are skipped; symlinks are followed only
/// while they stay inside `root`.
pub fn collect_audio_files(root: &Path) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && !symlink_escapes_root(e, root));

    walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_audio(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported_audio(Path::new("song.mp3")));
        assert!(is_supported_audio(Path::new("song.FLAC")));
        assert!(is_supported_audio(Path::new("song.Opus")));
        assert!(!is_supported_audio(Path::new("song.aac")));
        assert!(!is_supported_audio(Path::new("song.txt")));
        assert!(!is_supported_audio(Path::new("song")));
    }

    #[test]
    fn hidden_dirs_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join(".cache")).unwrap();
        std::fs::write(root.join(".cache/hidden.mp3"), b"x").unwrap();
        std::fs::write(root.join("visible.mp3"), b"x").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();

        let files = collect_audio_files(&root);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("visible.mp3"));
    }

    #[cfg(unix)]
    #[test]
    fn escaping_symlinks_are_skipped() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("outside.mp3"), b"x").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();
        std::fs::write(root.join("inside.mp3"), b"x").unwrap();

        let files = collect_audio_files(&root);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("inside.mp3"));
    }
}
