use crossbeam_channel::{Receiver, Sender};

use crate::capture::capture_error::CaptureFault;

/// Observer for a capture session.
///
/// Called synchronously from the capture thread (and once from the caller
/// of `start` for the first folder). Implementations should hand events
/// off quickly; anything slow here delays the next frame.
pub trait CaptureEvents: Send {
    fn on_frame(&self, folder: &str, filename: &str);

    fn on_error(&self, fault: &CaptureFault);

    fn on_new_folder(&self, folder: &str);

    /// The capture loop has exited, for whatever reason. The manager is
    /// already idle, so a new session may be started from here.
    fn on_stopped(&self) {}
}

pub type FrameCallback = Box<dyn Fn(&str, &str) + Send>;
pub type ErrorCallback = Box<dyn Fn(&CaptureFault) + Send>;
pub type FolderCallback = Box<dyn Fn(&str) + Send>;

/// Events as three independent closures. Unset callbacks are ignored.
#[derive(Default)]
pub struct CaptureCallbacks {
    frame: Option<FrameCallback>,
    error: Option<ErrorCallback>,
    new_folder: Option<FolderCallback>,
}

impl CaptureCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, f: impl Fn(&str, &str) + Send + 'static) -> Self {
        self.frame = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&CaptureFault) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn with_new_folder(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.new_folder = Some(Box::new(f));
        self
    }
}

impl CaptureEvents for CaptureCallbacks {
    fn on_frame(&self, folder: &str, filename: &str) {
        if let Some(ref f) = self.frame {
            f(folder, filename);
        }
    }

    fn on_error(&self, fault: &CaptureFault) {
        if let Some(ref f) = self.error {
            f(fault);
        }
    }

    fn on_new_folder(&self, folder: &str) {
        if let Some(ref f) = self.new_folder {
            f(folder);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Frame { folder: String, filename: String },
    Error(CaptureFault),
    NewFolder(String),
    Stopped,
}

/// Forwards every event onto a channel so another thread can deliver it
/// onward. Sends to a dropped receiver are discarded.
pub struct ChannelEvents {
    tx: Sender<CaptureEvent>,
}

impl ChannelEvents {
    pub fn new() -> (Self, Receiver<CaptureEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: CaptureEvent) {
        let _ = self.tx.send(event);
    }
}

impl CaptureEvents for ChannelEvents {
    fn on_frame(&self, folder: &str, filename: &str) {
        self.send(CaptureEvent::Frame {
            folder: folder.to_string(),
            filename: filename.to_string(),
        });
    }

    fn on_error(&self, fault: &CaptureFault) {
        self.send(CaptureEvent::Error(fault.clone()));
    }

    fn on_new_folder(&self, folder: &str) {
        self.send(CaptureEvent::NewFolder(folder.to_string()));
    }

    fn on_stopped(&self) {
        self.send(CaptureEvent::Stopped);
    }
}
