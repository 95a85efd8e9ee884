use std::time::Duration;

pub const STREAM_SCHEME: &str = "rtmp";

/// A new output folder is started once this much time has passed.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// Pause between loop iterations; caps capture at roughly one frame per second.
pub const CAPTURE_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive read failures tolerated before the source is reopened.
pub const RECONNECT_THRESHOLD: u32 = 5;

pub const OPEN_TIMEOUT: Duration = Duration::from_millis(5000);
pub const READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Socket receive buffer requested from the demuxer, in bytes.
pub const SOURCE_BUFFER_SIZE: u32 = 3 * 1024 * 1024;

pub const FOLDER_NAME_FORMAT: &str = "%Y%m%d_%H%M";
pub const FRAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const FRAME_FILE_PREFIX: &str = "frame_";
pub const HISTORY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DEFAULT_CAPTURE_ROOT: &str = "captures";
pub const DEFAULT_HISTORY_FILE: &str = "stream_history.json";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
