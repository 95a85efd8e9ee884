use chrono::{DateTime, TimeZone};

use crate::shared::constants::{FOLDER_NAME_FORMAT, FRAME_FILE_PREFIX, FRAME_TIMESTAMP_FORMAT};

/// Output folder name for `now`: `YYYYMMDD_HHMM`.
pub fn folder_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(FOLDER_NAME_FORMAT).to_string()
}

/// Frame file name for `now`: `frame_YYYYMMDD_HHMMSS.<extension>`.
///
/// Two frames captured within the same second share a name; the later one
/// replaces the earlier.
pub fn frame_filename<Tz: TimeZone>(now: &DateTime<Tz>, extension: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{FRAME_FILE_PREFIX}{}.{extension}",
        now.format(FRAME_TIMESTAMP_FORMAT)
    )
}
