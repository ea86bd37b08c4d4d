//! Per-song settings remembered between sessions.
//!
//! One JSON file per song, named after the file and a digest of its bytes,
//! so an edited file does not inherit positions that no longer line up.

use crate::error::Result;
use crate::player::PlayerSettings;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What is stored for one song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSettings {
    /// Transposition the positions were recorded with.
    pub transpose: i8,
    /// Player state.
    #[serde(flatten)]
    pub player: PlayerSettings,
}

/// Settings store rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct SettingsCache {
    dir: PathBuf,
}

impl SettingsCache {
    /// Creates a store in `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache key for a song: its file name plus the start of the SHA-256 of its bytes.
    pub fn key_for(name: &str, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();

        let safe_name: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}-{}", safe_name, hex::encode(&digest[..8]))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Directory the store writes to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads the settings saved under `key`.
    ///
    /// # Returns
    ///
    /// `None` if nothing was saved yet
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, key: &str) -> Result<Option<CachedSettings>> {
        let path = self.path_for(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let settings = serde_json::from_str(&data)?;
        tracing::debug!(path = %path.display(), "loaded cached settings");
        Ok(Some(settings))
    }

    /// Writes `settings` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, key: &str, settings: &CachedSettings) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), "saved settings");
        Ok(())
    }
}
