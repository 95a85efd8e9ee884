use std::path::Path;

use crate::shared::frame::Frame;

pub type WriteError = Box<dyn std::error::Error + Send + Sync>;

/// Persists captured frames as image files.
///
/// Shared by the capture thread for the whole session, so implementations
/// must tolerate being called from a thread other than the one that built
/// them. A failed write drops that one frame; the loop carries on.
pub trait ImageWriter: Send + Sync {
    /// Encodes `frame` into `path`, scaled to `size` when given. The
    /// encoding follows the extension of `path`.
    fn write(&self, path: &Path, frame: &Frame, size: Option<(u32, u32)>)
        -> Result<(), WriteError>;
}
