use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{OPEN_TIMEOUT, READ_TIMEOUT, SOURCE_BUFFER_SIZE};
use crate::shared::frame::Frame;
use crate::shared::stream_locator::StreamLocator;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open {locator}: {reason}")]
    Open { locator: String, reason: String },
    #[error("opening the stream timed out after {}ms", .0.as_millis())]
    OpenTimeout(Duration),
    #[error("no video stream found in {0}")]
    NoVideoStream(String),
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("no frame within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("stream ended")]
    EndOfStream,
    #[error("stream handle already released")]
    Released,
    #[error("demux/decode error: {0}")]
    Decode(String),
}

/// Transport hint handed to the demuxer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            other => Err(format!("Transport must be 'tcp' or 'udp', got '{other}'")),
        }
    }
}

/// Everything a source needs to open a stream; passed explicitly rather
/// than through process-wide decoder settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    pub open_timeout: Duration,
    pub read_timeout: Duration,
    pub transport: Transport,
    pub buffer_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            open_timeout: OPEN_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            transport: Transport::default(),
            buffer_size: SOURCE_BUFFER_SIZE,
        }
    }
}

/// Opens network video streams.
///
/// Implementations must return within roughly `config.open_timeout`.
pub trait VideoSource: Send + Sync {
    fn open(
        &self,
        locator: &StreamLocator,
        config: &SourceConfig,
    ) -> Result<Box<dyn VideoStream>, SourceError>;
}

/// An open stream handle, exclusively owned by one capture session.
pub trait VideoStream: Send {
    /// Blocks for at most the configured read timeout.
    fn read(&mut self) -> Result<Frame, ReadError>;

    /// Releases the underlying connection. Safe to call more than once.
    fn release(&mut self);
}
