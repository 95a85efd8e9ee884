use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use streamsnap_core::capture::capture_settings::{CaptureSettings, ImageFormat};
use streamsnap_core::shared::constants::{
    DEFAULT_CAPTURE_ROOT, DEFAULT_HISTORY_FILE, OPEN_TIMEOUT, READ_TIMEOUT, SOURCE_BUFFER_SIZE,
};
use streamsnap_core::video::domain::video_source::{SourceConfig, Transport};
use streamsnap_core::video::infrastructure::image_file_writer::DEFAULT_JPEG_QUALITY;

/// Persistent defaults for every command. Fields missing from the file
/// take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub capture_root: PathBuf,
    pub history_file: PathBuf,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    pub open_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub transport: Transport,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture_root: PathBuf::from(DEFAULT_CAPTURE_ROOT),
            history_file: PathBuf::from(DEFAULT_HISTORY_FILE),
            image_format: ImageFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            open_timeout_ms: OPEN_TIMEOUT.as_millis() as u64,
            read_timeout_ms: READ_TIMEOUT.as_millis() as u64,
            transport: Transport::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("StreamSnap").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing file: defaults. Unreadable or malformed file: defaults, with
    /// a warning.
    pub fn load_from(path: &Path) -> Self {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Could not read {}: {e}", path.display());
                return Self::default();
            }
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings in {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            transport: self.transport,
            buffer_size: SOURCE_BUFFER_SIZE,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            image_format: self.image_format,
            source: self.source_config(),
            ..CaptureSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.capture_root, PathBuf::from("captures"));
        assert_eq!(settings.open_timeout_ms, 5000);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "image_format": "png", "transport": "udp", "read_timeout_ms": 2500 }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.image_format, ImageFormat::Png);
        assert_eq!(settings.transport, Transport::Udp);
        assert_eq!(settings.read_timeout_ms, 2500);
        assert_eq!(settings.open_timeout_ms, 5000);
        assert_eq!(settings.history_file, PathBuf::from("stream_history.json"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("StreamSnap").join("settings.json");
        let settings = Settings {
            capture_root: PathBuf::from("/srv/frames"),
            jpeg_quality: 75,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_capture_settings_carry_timeouts_and_format() {
        let settings = Settings {
            image_format: ImageFormat::Png,
            open_timeout_ms: 1200,
            read_timeout_ms: 800,
            ..Settings::default()
        };
        let capture = settings.capture_settings();
        assert_eq!(capture.image_format, ImageFormat::Png);
        assert_eq!(capture.source.open_timeout, Duration::from_millis(1200));
        assert_eq!(capture.source.read_timeout, Duration::from_millis(800));
        assert_eq!(capture.reconnect_threshold, 5);
    }
}
