//! Viewer settings and persisted UI preferences.
//!
//! Settings load from and save to a JSON file. Unknown or missing fields
//! fall back to their defaults, so older files keep loading.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use albis_analysis::peaks::{DEFAULT_MAX_PEAKS, MAX_PEAKS_LIMIT};
use albis_core::Colormap;
use albis_io::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, HEALTH_TIMEOUT};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Slowest playback rate.
pub const MIN_FPS: u32 = 1;
/// Fastest playback rate.
pub const MAX_FPS: u32 = 10;

const MIN_PANEL_WIDTH: u32 = 220;
const MAX_PANEL_WIDTH: u32 = 900;

/// Viewer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Backend API root.
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub health_timeout_ms: u64,
    /// Colormap selected on startup.
    pub colormap: Colormap,
    pub auto_scale: bool,
    /// Playback rate, `1..=10`.
    pub fps: u32,
    /// Number of peaks to detect, `1..=500`.
    pub peak_count: usize,
    /// Symlog histogram x-axis.
    pub hist_log_x: bool,
    pub ui: UiPreferences,
}

#[allow(clippy::cast_possible_truncation)]
impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            health_timeout_ms: HEALTH_TIMEOUT.as_millis() as u64,
            colormap: Colormap::Gray,
            auto_scale: true,
            fps: MAX_FPS,
            peak_count: DEFAULT_MAX_PEAKS,
            hist_log_x: false,
            ui: UiPreferences::default(),
        }
    }
}

impl ViewerConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    #[must_use]
    pub fn with_auto_scale(mut self, auto_scale: bool) -> Self {
        self.auto_scale = auto_scale;
        self
    }

    /// Set the playback rate, clamped to `1..=10`.
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.clamp(MIN_FPS, MAX_FPS);
        self
    }

    /// Set the peak count, clamped to `1..=500`.
    #[must_use]
    pub fn with_peak_count(mut self, count: usize) -> Self {
        self.peak_count = count.clamp(1, MAX_PEAKS_LIMIT);
        self
    }

    /// Clamp out-of-range values read from a file.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.fps = self.fps.clamp(MIN_FPS, MAX_FPS);
        self.peak_count = self.peak_count.clamp(1, MAX_PEAKS_LIMIT);
        self.ui.panel_width = self.ui.panel_width.clamp(MIN_PANEL_WIDTH, MAX_PANEL_WIDTH);
        if self.ui.active_tab == "tools" {
            self.ui.active_tab = "view".to_string();
        }
        self
    }

    /// HTTP client settings.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            health_timeout: Duration::from_millis(self.health_timeout_ms),
        }
    }

    /// Load settings from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        Ok(config.sanitized())
    }

    /// Load settings from a JSON string.
    ///
    /// # Errors
    /// Returns an error if `json` is not valid JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable.
    #[must_use]
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::from_file(path).unwrap_or_else(|e| {
            log::warn!("ignoring settings file {}: {e}", path.display());
            Self::default()
        })
    }

    /// Write settings as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Image source the autoloader follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoloadMode {
    /// Frames come from the selected file.
    #[default]
    File,
    /// Follow the newest file in a folder.
    Watch,
    /// Poll a SIMPLON detector monitor.
    Simplon,
}

/// File types considered by the folder autoloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoloadTypes {
    pub hdf5: bool,
    pub tiff: bool,
    pub cbf: bool,
    pub edf: bool,
}

impl Default for AutoloadTypes {
    fn default() -> Self {
        Self {
            hdf5: true,
            tiff: true,
            cbf: true,
            edf: true,
        }
    }
}

/// Autoloader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoloadSettings {
    pub mode: AutoloadMode,
    pub dir: String,
    /// Folder polling interval.
    pub interval_ms: u64,
    pub types: AutoloadTypes,
    /// Filename filter with `*` / `?` wildcards.
    pub pattern: String,
    pub simplon_url: String,
    pub simplon_version: String,
    pub simplon_timeout_ms: u64,
    pub simplon_enable: bool,
    pub auto_start: bool,
}

impl Default for AutoloadSettings {
    fn default() -> Self {
        Self {
            mode: AutoloadMode::File,
            dir: String::new(),
            interval_ms: 1000,
            types: AutoloadTypes::default(),
            pattern: String::new(),
            simplon_url: String::new(),
            simplon_version: "1.8.0".to_string(),
            simplon_timeout_ms: 500,
            simplon_enable: true,
            auto_start: false,
        }
    }
}

/// Layout and help preferences. The viewer core stores these but does not
/// interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    pub panel_width: u32,
    pub panel_collapsed: bool,
    pub active_tab: String,
    /// Ids of collapsed side-panel sections.
    pub collapsed_sections: Vec<String>,
    pub autoload: AutoloadSettings,
    pub tool_hints: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            panel_width: 640,
            panel_collapsed: true,
            active_tab: "view".to_string(),
            collapsed_sections: Vec::new(),
            autoload: AutoloadSettings::default(),
            tool_hints: false,
        }
    }
}

impl UiPreferences {
    /// Whether section `id` is collapsed.
    #[must_use]
    pub fn is_collapsed(&self, id: &str) -> bool {
        self.collapsed_sections.iter().any(|s| s == id)
    }

    /// Collapse or expand section `id`.
    pub fn set_collapsed(&mut self, id: &str, collapsed: bool) {
        self.collapsed_sections.retain(|s| s != id);
        if collapsed {
            self.collapsed_sections.push(id.to_string());
        }
    }

    /// Set the side-panel width, clamped to `220..=900`.
    pub fn set_panel_width(&mut self, width: u32) {
        self.panel_width = width.clamp(MIN_PANEL_WIDTH, MAX_PANEL_WIDTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8000/api");
        assert_eq!(config.colormap, Colormap::Gray);
        assert!(config.auto_scale);
        assert_eq!(config.fps, 10);
        assert_eq!(config.peak_count, 25);
        assert!(!config.hist_log_x);
        assert_eq!(config.client_config().health_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_builder_clamps() {
        let config = ViewerConfig::default().with_fps(0).with_peak_count(9000);
        assert_eq!(config.fps, 1);
        assert_eq!(config.peak_count, 500);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            ViewerConfig::from_json(r#"{"colormap":"albulaHdr","fps":40,"ui":{"active_tab":"tools"}}"#)
                .unwrap();
        assert_eq!(config.colormap, Colormap::AlbulaHdr);
        assert_eq!(config.fps, 10);
        assert_eq!(config.ui.active_tab, "view");
        assert_eq!(config.ui.autoload.simplon_version, "1.8.0");
        assert!(config.ui.autoload.types.edf);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut config = ViewerConfig::default()
            .with_base_url("http://beamline:8000/api")
            .with_colormap(Colormap::Viridis);
        config.ui.set_collapsed("histogram", true);
        config.ui.autoload.mode = AutoloadMode::Simplon;
        config.save(&path).unwrap();

        let loaded = ViewerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.ui.is_collapsed("histogram"));
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempdir().unwrap();
        let missing = ViewerConfig::load_or_default(dir.path().join("absent.json"));
        assert_eq!(missing, ViewerConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        assert_eq!(ViewerConfig::load_or_default(&broken), ViewerConfig::default());
    }

    #[test]
    fn test_section_toggle() {
        let mut ui = UiPreferences::default();
        ui.set_collapsed("roi", true);
        ui.set_collapsed("roi", true);
        assert_eq!(ui.collapsed_sections.len(), 1);
        ui.set_collapsed("roi", false);
        assert!(!ui.is_collapsed("roi"));
        ui.set_panel_width(50);
        assert_eq!(ui.panel_width, 220);
    }
}
