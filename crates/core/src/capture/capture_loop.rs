use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::capture_error::CaptureFault;
use crate::capture::capture_events::CaptureEvents;
use crate::capture::capture_settings::CaptureSettings;
use crate::shared::clock::Clock;
use crate::shared::frame::Frame;
use crate::shared::stream_locator::StreamLocator;
use crate::storage::capture_store::CaptureStore;
use crate::storage::naming;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_source::{ReadError, VideoSource, VideoStream};

/// Shared, long-lived collaborators of every capture session.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub store: Arc<CaptureStore>,
    pub source: Arc<dyn VideoSource>,
    pub writer: Arc<dyn ImageWriter>,
    pub clock: Arc<dyn Clock>,
}

/// Per-session state the manager keeps a handle on.
pub(crate) struct SessionHandles {
    pub cancelled: Arc<AtomicBool>,
    pub folder: Arc<Mutex<String>>,
}

enum Flow {
    Continue,
    Stop,
}

/// The body of one capture session.
///
/// Owns the open stream exclusively; nothing else reads from or releases
/// it while the loop runs. Every iteration pauses for the capture interval
/// whatever its outcome.
pub(crate) struct CaptureLoop {
    locator: StreamLocator,
    stream: Option<Box<dyn VideoStream>>,
    deps: Collaborators,
    settings: CaptureSettings,
    events: Box<dyn CaptureEvents>,
    cancelled: Arc<AtomicBool>,
    folder: Arc<Mutex<String>>,
    last_rotation: Duration,
    consecutive_failures: u32,
}

impl CaptureLoop {
    pub fn new(
        locator: StreamLocator,
        stream: Box<dyn VideoStream>,
        deps: Collaborators,
        settings: CaptureSettings,
        events: Box<dyn CaptureEvents>,
        handles: &SessionHandles,
        rotated_at: Duration,
    ) -> Self {
        Self {
            locator,
            stream: Some(stream),
            deps,
            settings,
            events,
            cancelled: handles.cancelled.clone(),
            folder: handles.folder.clone(),
            last_rotation: rotated_at,
            consecutive_failures: 0,
        }
    }

    /// Runs until cancelled or a terminal fault, then releases the stream.
    ///
    /// `on_exit` runs after the release and before `on_stopped`, so an
    /// observer reacting to the stop sees the manager idle. If the loop
    /// unwinds past this point `on_exit` is dropped instead of called.
    pub fn run<F: FnOnce()>(mut self, on_exit: F) {
        log::info!("Capture loop started for {}", self.locator);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_iterations()));
        if let Err(payload) = outcome {
            let fault = CaptureFault::Panicked(panic_message(payload.as_ref()));
            log::error!("{fault}");
            self.notify(|events| events.on_error(&fault));
        }

        self.release_stream();
        on_exit();
        self.notify(|events| events.on_stopped());
        log::info!("Capture loop finished for {}", self.locator);
    }

    fn run_iterations(&mut self) {
        while !self.is_cancelled() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.step()))
                .unwrap_or_else(|payload| {
                    Err(CaptureFault::Runtime(format!(
                        "iteration panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(fault) => {
                    log::error!("{fault}");
                    self.events.on_error(&fault);
                }
            }
            if self.is_cancelled() {
                break;
            }
            self.deps.clock.sleep(self.settings.capture_interval);
        }
    }

    /// Observer calls on the way out; a panicking observer is logged and
    /// ignored.
    fn notify(&self, call: impl FnOnce(&dyn CaptureEvents)) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(self.events.as_ref())));
        if let Err(payload) = outcome {
            log::error!(
                "Capture observer panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    fn step(&mut self) -> Result<Flow, CaptureFault> {
        if self.rotation_due() {
            self.rotate()?;
        }

        let result = match self.stream.as_mut() {
            Some(stream) => stream.read(),
            None => Err(ReadError::Released),
        };
        if self.is_cancelled() {
            return Ok(Flow::Stop);
        }

        match result {
            Err(e) => Ok(self.handle_read_failure(e)),
            Ok(frame) => {
                self.consecutive_failures = 0;
                if frame.is_empty() {
                    log::warn!("Received an empty frame from {}, skipping", self.locator);
                    return Ok(Flow::Continue);
                }
                self.save(&frame)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn rotation_due(&self) -> bool {
        self.deps.clock.elapsed().saturating_sub(self.last_rotation)
            >= self.settings.rotation_interval
    }

    /// On failure the previous folder stays current and the next iteration
    /// tries again.
    fn rotate(&mut self) -> Result<(), CaptureFault> {
        let now = self.deps.clock.elapsed();
        let folder = self
            .deps
            .store
            .create_folder(&self.deps.clock.local_now())
            .map_err(|e| CaptureFault::Runtime(e.to_string()))?;

        *lock(&self.folder) = folder.clone();
        self.last_rotation = now;
        self.consecutive_failures = 0;
        log::info!("Rotated to folder {folder}");
        self.events.on_new_folder(&folder);
        Ok(())
    }

    fn handle_read_failure(&mut self, error: ReadError) -> Flow {
        self.consecutive_failures += 1;
        let fault = CaptureFault::Read {
            attempt: self.consecutive_failures,
            reason: error.to_string(),
        };
        log::warn!("{fault}");
        self.events.on_error(&fault);

        if self.consecutive_failures < self.settings.reconnect_threshold {
            return Flow::Continue;
        }

        log::warn!(
            "{} consecutive read failures, reconnecting to {}",
            self.consecutive_failures,
            self.locator
        );
        self.release_stream();
        match self.deps.source.open(&self.locator, &self.settings.source) {
            Ok(stream) => {
                log::info!("Reconnected to {}", self.locator);
                self.stream = Some(stream);
                self.consecutive_failures = 0;
                Flow::Continue
            }
            Err(e) => {
                let fault = CaptureFault::Reconnect {
                    locator: self.locator.to_string(),
                    reason: e.to_string(),
                };
                log::error!("{fault}");
                self.events.on_error(&fault);
                Flow::Stop
            }
        }
    }

    fn save(&self, frame: &Frame) -> Result<(), CaptureFault> {
        let folder = lock(&self.folder).clone();
        let filename = naming::frame_filename(
            &self.deps.clock.local_now(),
            self.settings.image_format.extension(),
        );
        let path = self
            .deps
            .store
            .frame_path(&folder, &filename)
            .map_err(|e| CaptureFault::Runtime(e.to_string()))?;

        self.deps
            .writer
            .write(&path, frame, self.settings.resize)
            .map_err(|e| CaptureFault::Write {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        log::debug!("Saved frame {}", path.display());
        self.events.on_frame(&folder, &filename);
        Ok(())
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub(crate) fn lock(folder: &Mutex<String>) -> std::sync::MutexGuard<'_, String> {
    folder.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let from_str = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(from_str.as_ref()), "static message");

        let code = 7;
        let from_string = panic::catch_unwind(move || panic!("code {code}")).unwrap_err();
        assert_eq!(panic_message(from_string.as_ref()), "code 7");

        let opaque = panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic");
    }
}
