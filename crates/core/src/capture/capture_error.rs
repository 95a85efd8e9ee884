use thiserror::Error;

use crate::shared::stream_locator::LocatorError;
use crate::storage::capture_store::StorageError;
use crate::video::domain::video_source::SourceError;

/// Why a capture could not be started. Returned synchronously from
/// `CaptureManager::start`; nothing here ever comes from a running loop.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("invalid stream address: {0}")]
    InvalidLocator(#[from] LocatorError),
    #[error("a stream is already being captured; stop it first")]
    AlreadyCapturing,
    #[error("could not open stream: {0}")]
    SourceOpenFailure(#[from] SourceError),
    #[error("could not create capture folder: {0}")]
    Storage(#[from] StorageError),
    #[error("could not start capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A problem inside a running capture loop, delivered through
/// `CaptureEvents::on_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureFault {
    /// Transient; retried until the reconnect threshold.
    #[error("failed to read frame (consecutive failures: {attempt}): {reason}")]
    Read { attempt: u32, reason: String },
    /// Ends the session.
    #[error("failed to reconnect to {locator}: {reason}")]
    Reconnect { locator: String, reason: String },
    /// Transient; the frame is dropped.
    #[error("failed to save {path}: {reason}")]
    Write { path: String, reason: String },
    /// Transient; reported and the loop carries on. Covers panics raised
    /// within a single iteration.
    #[error("capture error: {0}")]
    Runtime(String),
    /// A panic outside any single iteration. Ends the session.
    #[error("capture thread crashed: {0}")]
    Panicked(String),
}

impl CaptureFault {
    /// Whether the session ends after this fault.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureFault::Reconnect { .. } | CaptureFault::Panicked(_)
        )
    }
}
