//! Path management
//!
//! Resolves where the library index database and backups live.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable that overrides the default data directory
pub const HOME_ENV: &str = "MUSIC_TOOLS_HOME";

const DATA_DIR_NAME: &str = ".music-tools";
const DB_FILE_NAME: &str = "library_index.db";

/// Filesystem locations for persistent state.
///
/// A plain value: resolved once in the binary and passed down. Precedence is
/// explicit override, then `MUSIC_TOOLS_HOME`, then `<home>/.music-tools`.
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = if let Some(dir) = override_dir {
            dir
        } else if let Some(dir) = std::env::var_os(HOME_ENV) {
            PathBuf::from(dir)
        } else {
            let home = directories::UserDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_else(|| Error::user("could not determine a home directory"))?;
            home.join(DATA_DIR_NAME)
        };

        let paths = Paths { data_dir };
        paths.create_directories()?;
        Ok(paths)
    }

    fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| Error::user(format!("cannot create {}: {e}", self.data_dir.display())))?;
        std::fs::create_dir_all(self.backups_dir())
            .map_err(|e| Error::user(format!("cannot create backups dir: {e}")))?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The library index database
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Default parent for deletion backups
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}
