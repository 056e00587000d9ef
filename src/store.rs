//! Settings persistence surfaces.
//!
//! Three surfaces share the one [`SettingsRecord`] shape: a local store
//! (file-per-key under a base directory, with a single fixed key), file
//! export, and file import. Import is atomic: a parse failure returns the
//! error before anything is applied.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::ViewerError;
use crate::settings::SettingsRecord;

/// The single fixed key the viewer persists under.
pub const SETTINGS_KEY: &str = "maquette.viewer.settings";

/// File-backed key-value store for settings.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    base_dir: PathBuf,
}

impl SettingsStore {
    /// Store rooted at the given directory (created on first save).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Default store location: `$HOME/.maquette`, falling back to the
    /// current directory when no home is set.
    pub fn default_location() -> Self {
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".maquette");
        Self::new(base)
    }

    fn key_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.json", SETTINGS_KEY))
    }

    /// Persist a record under the fixed key.
    pub fn save(&self, record: &SettingsRecord) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("creating {}", self.base_dir.display()))?;
        let path = self.key_path();
        fs::write(&path, record.serialize())
            .with_context(|| format!("writing {}", path.display()))?;
        log::debug!("settings saved to {}", path.display());
        Ok(())
    }

    /// Load the record saved under the fixed key, or `None` when nothing has
    /// been saved yet. A corrupt store surfaces as a ParseError.
    pub fn load(&self) -> Result<Option<SettingsRecord>, ViewerError> {
        let path = self.key_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| ViewerError::Parse(e.to_string()))?;
        SettingsRecord::deserialize(&text).map(Some)
    }
}

/// Export a record to a user-chosen `.json` file.
pub fn export_file(record: &SettingsRecord, path: &Path) -> Result<()> {
    fs::write(path, record.serialize()).with_context(|| format!("writing {}", path.display()))
}

/// Import a record from a user-chosen `.json` file. Read or parse failure
/// returns the error without touching live state; the caller applies the
/// record only on success.
pub fn import_file(path: &Path) -> Result<SettingsRecord, ViewerError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ViewerError::Parse(format!("{}: {}", path.display(), e)))?;
    SettingsRecord::deserialize(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> SettingsStore {
        let dir = std::env::temp_dir().join(format!(
            "maquette-store-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        SettingsStore::new(dir)
    }

    #[test]
    fn test_load_before_save_is_none() {
        let store = temp_store("empty");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = temp_store("roundtrip");
        let mut record = SettingsRecord::default();
        record.exposure = 1.7;
        record.dir_color = "#123456".to_string();
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn test_corrupt_store_is_parse_error() {
        let store = temp_store("corrupt");
        store.save(&SettingsRecord::default()).unwrap();
        fs::write(store.key_path(), "]]]").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_export_import_round_trips() {
        let store = temp_store("export");
        fs::create_dir_all(&store.base_dir).unwrap();
        let path = store.base_dir.join("preset.json");
        let mut record = SettingsRecord::default();
        record.bloom_enabled = true;
        export_file(&record, &path).unwrap();
        assert_eq!(import_file(&path).unwrap(), record);
    }

    #[test]
    fn test_import_missing_file_is_error() {
        assert!(import_file(Path::new("/nonexistent/preset.json")).is_err());
    }
}
