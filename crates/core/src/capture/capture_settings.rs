use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{CAPTURE_INTERVAL, RECONNECT_THRESHOLD, ROTATION_INTERVAL};
use crate::video::domain::video_source::SourceConfig;

/// Encoding of saved frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    #[serde(rename = "jpg", alias = "jpeg")]
    Jpeg,
    #[serde(rename = "png")]
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(format!("Image format must be 'jpg' or 'png', got '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSettings {
    pub rotation_interval: Duration,
    pub capture_interval: Duration,
    pub reconnect_threshold: u32,
    pub image_format: ImageFormat,
    /// Saved frames are scaled to this size when set.
    pub resize: Option<(u32, u32)>,
    pub source: SourceConfig,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            rotation_interval: ROTATION_INTERVAL,
            capture_interval: CAPTURE_INTERVAL,
            reconnect_threshold: RECONNECT_THRESHOLD,
            image_format: ImageFormat::default(),
            resize: None,
            source: SourceConfig::default(),
        }
    }
}
