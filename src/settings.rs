use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use crate::viewport::{ViewportConfig, ZoomPolicy, clamp_zoom};
use crate::visibility::{DEFAULT_COMMIT_INTERVAL, DEFAULT_VISIBILITY_THRESHOLD, ResolverConfig};
use crate::window::DEFAULT_BUFFER_RADIUS;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagekeeper";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Minimum visible ratio a page needs to become current
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,

    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    /// Pages rendered on each side of the current page
    #[serde(default = "default_buffer_radius")]
    pub buffer_radius: usize,

    #[serde(default = "default_zoom")]
    pub default_zoom: f32,

    #[serde(default = "default_narrow_zoom")]
    pub narrow_zoom: f32,

    #[serde(default = "default_narrow_viewport_width")]
    pub narrow_viewport_width: f32,

    #[serde(default = "default_page_gap")]
    pub page_gap: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_visibility_threshold() -> f32 {
    DEFAULT_VISIBILITY_THRESHOLD
}

fn default_commit_interval_ms() -> u64 {
    DEFAULT_COMMIT_INTERVAL.as_millis() as u64
}

fn default_buffer_radius() -> usize {
    DEFAULT_BUFFER_RADIUS
}

fn default_zoom() -> f32 {
    1.0
}

fn default_narrow_zoom() -> f32 {
    0.6
}

fn default_narrow_viewport_width() -> f32 {
    768.0
}

fn default_page_gap() -> f32 {
    16.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            visibility_threshold: default_visibility_threshold(),
            commit_interval_ms: default_commit_interval_ms(),
            buffer_radius: default_buffer_radius(),
            default_zoom: default_zoom(),
            narrow_zoom: default_narrow_zoom(),
            narrow_viewport_width: default_narrow_viewport_width(),
            page_gap: default_page_gap(),
            annotations_dir: None,
        }
    }
}

impl Settings {
    /// Bring out-of-range values back to something the reader can use
    pub fn sanitize(&mut self) {
        self.visibility_threshold = if self.visibility_threshold.is_nan() {
            default_visibility_threshold()
        } else {
            self.visibility_threshold.clamp(0.0, 1.0)
        };
        self.default_zoom = clamp_zoom(self.default_zoom);
        self.narrow_zoom = clamp_zoom(self.narrow_zoom);
        if !self.narrow_viewport_width.is_finite() || self.narrow_viewport_width < 0.0 {
            self.narrow_viewport_width = default_narrow_viewport_width();
        }
        if !self.page_gap.is_finite() || self.page_gap < 0.0 {
            self.page_gap = default_page_gap();
        }
    }

    pub fn viewport_config(&self) -> ViewportConfig {
        ViewportConfig {
            buffer_radius: self.buffer_radius,
            page_gap: self.page_gap,
            resolver: ResolverConfig {
                threshold: self.visibility_threshold,
                commit_interval: Duration::from_millis(self.commit_interval_ms),
            },
            zoom: ZoomPolicy {
                default_zoom: self.default_zoom,
                narrow_zoom: self.narrow_zoom,
                narrow_viewport_width: self.narrow_viewport_width,
            },
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from the user config directory, writing defaults if absent
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

/// Load settings from an explicit file; a bad file leaves current settings in place
pub fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                settings.sanitize();

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = match serde_yaml::to_string(settings) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

/// Snapshot of the active settings
pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn viewport_config() -> ViewportConfig {
    current().viewport_config()
}

pub fn annotations_dir() -> Option<PathBuf> {
    SETTINGS
        .read()
        .ok()
        .and_then(|s| s.annotations_dir.clone())
}

pub fn set_annotations_dir(dir: Option<PathBuf>) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.annotations_dir = dir;
    }
}

/// Restore defaults (used between tests)
pub fn reset() {
    if let Ok(mut settings) = SETTINGS.write() {
        *settings = Settings::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: Settings = serde_yaml::from_str("buffer_radius: 4\n").unwrap();
        assert_eq!(settings.buffer_radius, 4);
        assert_eq!(settings.visibility_threshold, 0.6);
        assert_eq!(settings.commit_interval_ms, 100);
        assert_eq!(settings.page_gap, 16.0);
        assert_eq!(settings.annotations_dir, None);
    }

    #[test]
    fn test_sanitize_clamps_out_of_range() {
        let mut settings = Settings {
            visibility_threshold: 1.7,
            default_zoom: 9.0,
            narrow_zoom: f32::NAN,
            page_gap: -3.0,
            ..Settings::default()
        };
        settings.sanitize();
        assert_eq!(settings.visibility_threshold, 1.0);
        assert_eq!(settings.default_zoom, 3.0);
        assert_eq!(settings.narrow_zoom, 1.0);
        assert_eq!(settings.page_gap, 16.0);
    }

    #[test]
    fn test_viewport_config_carries_values() {
        let settings = Settings {
            commit_interval_ms: 250,
            buffer_radius: 1,
            ..Settings::default()
        };
        let config = settings.viewport_config();
        assert_eq!(config.buffer_radius, 1);
        assert_eq!(config.resolver.commit_interval, Duration::from_millis(250));
        assert_eq!(config.zoom.narrow_viewport_width, 768.0);
    }

    #[test]
    #[serial]
    fn test_load_from_path_updates_global() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "version: 1\nvisibility_threshold: 0.75\nannotations_dir: /tmp/notes\n").unwrap();

        load_settings_from_path(&path);
        assert_eq!(current().visibility_threshold, 0.75);
        assert_eq!(annotations_dir(), Some(PathBuf::from("/tmp/notes")));
        assert_eq!(viewport_config().resolver.threshold, 0.75);
        reset();
    }

    #[test]
    #[serial]
    fn test_bad_file_keeps_current_settings() {
        reset();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "buffer_radius: [oops").unwrap();

        load_settings_from_path(&path);
        assert_eq!(current(), Settings::default());
    }

    #[test]
    #[serial]
    fn test_old_version_is_migrated_and_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "version: 0\npage_gap: 8.0\n").unwrap();

        load_settings_from_path(&path);
        let written: Settings = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.version, CURRENT_VERSION);
        assert_eq!(written.page_gap, 8.0);
        reset();
    }
}
