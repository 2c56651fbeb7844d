//! Editor Settings
//!
//! Persistent editor settings with:
//! - Atomic file writes (temp file + rename)
//! - Defaults for every missing field
//! - Normalization instead of hard failure on bad values
//!
//! Storage location: {settings_dir}/settings.json

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{
    captions::{ImportOptions, TimeMarkOptions},
    fs, tracks::AutoPreset, CoreResult, GlobalInterval, Ms,
    IMPORT_SNAP_MS, INTERVAL_PRESETS,
};

/// Settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file suffix (advisory lock against concurrent writers)
const LOCK_SUFFIX: &str = "lock";

/// Editor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Display interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: Ms,

    /// Resolution imported offsets are snapped to
    #[serde(default = "default_import_snap_ms")]
    pub import_snap_ms: Ms,

    /// Policy for folding detected voice segments into track 0
    #[serde(default)]
    pub auto_preset: AutoPreset,

    /// Export settings
    #[serde(default)]
    pub export: ExportSettings,

    /// Voice timeline export settings
    #[serde(default)]
    pub time_marks: TimeMarkOptions,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_interval_ms() -> Ms {
    GlobalInterval::default().ms()
}

fn default_import_snap_ms() -> Ms {
    IMPORT_SNAP_MS
}

fn default_true() -> bool {
    true
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            interval_ms: default_interval_ms(),
            import_snap_ms: default_import_snap_ms(),
            auto_preset: AutoPreset::default(),
            export: ExportSettings::default(),
            time_marks: TimeMarkOptions::default(),
        }
    }
}

impl EditorSettings {
    /// Corrects out-of-range values in place.
    ///
    /// The interval snaps to the nearest selectable preset and the import
    /// snap is clamped to `1..=1000`.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;
        self.interval_ms = nearest_preset(self.interval_ms);
        self.import_snap_ms = self.import_snap_ms.clamp(1, 1_000);
    }

    /// Active interval
    pub fn interval(&self) -> GlobalInterval {
        GlobalInterval::new(self.interval_ms).unwrap_or_default()
    }

    /// Import options for the active interval
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            interval: self.interval(),
            snap_ms: self.import_snap_ms.max(1),
        }
    }
}

fn nearest_preset(ms: Ms) -> Ms {
    INTERVAL_PRESETS
        .iter()
        .copied()
        .min_by_key(|preset| preset.abs_diff(ms))
        .unwrap_or_else(default_interval_ms)
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Render in memory and swap the file into place
    #[serde(default = "default_true")]
    pub atomic_write: bool,

    /// Offset added to exported timestamps when none is given
    #[serde(default)]
    pub default_offset_ms: Ms,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            atomic_write: true,
            default_offset_ms: 0,
        }
    }
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Loads and saves [`EditorSettings`] at a fixed path
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Manager for `{dir}/settings.json`
    pub fn new(dir: PathBuf) -> Self {
        Self {
            settings_path: dir.join(SETTINGS_FILE),
        }
    }

    /// Manager for an explicit settings file
    pub fn with_file(path: PathBuf) -> Self {
        Self {
            settings_path: path,
        }
    }

    /// Settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    fn lock_path(&self) -> PathBuf {
        let name = self
            .settings_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| SETTINGS_FILE.to_string());
        self.settings_path
            .with_file_name(format!("{name}.{LOCK_SUFFIX}"))
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }
        result
    }

    /// Loads settings, falling back to defaults when the file is missing or
    /// unreadable
    pub fn load(&self) -> EditorSettings {
        if !self.settings_path.exists() {
            info!(path = %self.settings_path.display(), "Settings file not found, using defaults");
            return EditorSettings::default();
        }

        match self.with_lock(false, || self.read()) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    path = %self.settings_path.display(),
                    "Failed to load settings, using defaults: {}", e
                );
                EditorSettings::default()
            }
        }
    }

    fn read(&self) -> CoreResult<EditorSettings> {
        let content = std::fs::read_to_string(&self.settings_path)?;
        let mut settings: EditorSettings = serde_json::from_str(&content)?;
        settings.normalize();
        Ok(settings)
    }

    /// Normalizes and persists `settings`, returning what was written
    pub fn save(&self, settings: &EditorSettings) -> CoreResult<EditorSettings> {
        let mut normalized = settings.clone();
        normalized.normalize();
        self.with_lock(true, || fs::atomic_write_json_pretty(&self.settings_path, &normalized))?;
        info!(path = %self.settings_path.display(), "Settings saved");
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = EditorSettings::default();
        assert_eq!(settings.interval_ms, 100);
        assert_eq!(settings.import_snap_ms, 20);
        assert!(settings.auto_preset.merge_as_single_span);
        assert!(settings.auto_preset.text.is_empty());
        assert!(settings.export.atomic_write);
        assert_eq!(settings.export.default_offset_ms, 0);
        assert_eq!(settings.time_marks.max_ignore_ms, 100);
        assert_eq!(settings.time_marks.max_merge_ms, 100);
        assert!(!settings.time_marks.unnumbered_copy);
    }

    #[test]
    fn test_settings_serialization_is_camel_case() {
        let json = serde_json::to_value(EditorSettings::default()).unwrap();
        assert_eq!(json["intervalMs"], 100);
        assert_eq!(json["importSnapMs"], 20);
        assert_eq!(json["autoPreset"]["mergeAsSingleSpan"], true);
        assert_eq!(json["export"]["atomicWrite"], true);
        assert_eq!(json["timeMarks"]["priority"], "merge");
        assert_eq!(json["timeMarks"]["timing"], "relative");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: EditorSettings =
            serde_json::from_str(r#"{ "autoPreset": { "text": "voice" } }"#).unwrap();
        assert_eq!(settings.interval_ms, 100);
        assert_eq!(settings.auto_preset.text, "voice");
        assert!(settings.auto_preset.merge_as_single_span);
    }

    #[test]
    fn test_normalize_snaps_interval_and_clamps_snap() {
        let mut settings = EditorSettings {
            interval_ms: 0,
            import_snap_ms: 0,
            ..EditorSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.interval_ms, 20);
        assert_eq!(settings.import_snap_ms, 1);

        settings.interval_ms = 430;
        settings.import_snap_ms = 50_000;
        settings.normalize();
        assert_eq!(settings.interval_ms, 400);
        assert_eq!(settings.import_snap_ms, 1_000);

        settings.interval_ms = 90_000;
        settings.normalize();
        assert_eq!(settings.interval(), GlobalInterval::new(1_000).unwrap());
    }

    #[test]
    fn test_manager_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path().to_path_buf());
        assert_eq!(manager.load(), EditorSettings::default());
    }

    #[test]
    fn test_manager_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path().to_path_buf());
        std::fs::write(manager.settings_path(), "{ not json").unwrap();
        assert_eq!(manager.load(), EditorSettings::default());
    }

    #[test]
    fn test_manager_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path().join("config"));

        let mut settings = EditorSettings::default();
        settings.interval_ms = 480;
        settings.auto_preset.text = "(voice)".to_string();
        settings.export.atomic_write = false;

        let saved = manager.save(&settings).unwrap();
        assert_eq!(saved.interval_ms, 500);

        let loaded = manager.load();
        assert_eq!(loaded, saved);
        assert!(!loaded.export.atomic_write);
    }
}
