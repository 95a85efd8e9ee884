use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::capture_error::CaptureError;
use crate::capture::capture_events::CaptureEvents;
use crate::capture::capture_loop::{self, CaptureLoop, Collaborators, SessionHandles};
use crate::capture::capture_settings::CaptureSettings;
use crate::history::history_store::HistoryStore;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::stream_locator::StreamLocator;
use crate::storage::capture_store::CaptureStore;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_source::{VideoSource, VideoStream};

struct LiveSession {
    id: u64,
    locator: StreamLocator,
    cancelled: Arc<AtomicBool>,
    folder: Arc<Mutex<String>>,
    thread: Option<JoinHandle<()>>,
}

/// What `start` has set up before the loop takes over.
struct Prepared {
    locator: StreamLocator,
    folder: String,
    stream: Box<dyn VideoStream>,
    rotated_at: Duration,
}

enum Slot {
    Idle,
    /// `start` is between its checks and spawning the loop.
    Starting { cancelled: Arc<AtomicBool> },
    Live(LiveSession),
}

/// Owns at most one capture session at a time.
///
/// `start` validates the address, creates the first folder, records the
/// stream in history, opens it and hands it to a dedicated capture thread.
/// `stop` cancels that thread and waits for it, bounded by one read
/// timeout plus one capture interval. Dropping the manager stops any
/// running session.
pub struct CaptureManager {
    deps: Collaborators,
    history: Arc<dyn HistoryStore>,
    settings: CaptureSettings,
    slot: Arc<Mutex<Slot>>,
    next_session_id: AtomicU64,
}

impl CaptureManager {
    pub fn new(
        store: CaptureStore,
        source: Arc<dyn VideoSource>,
        writer: Arc<dyn ImageWriter>,
        history: Arc<dyn HistoryStore>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            deps: Collaborators {
                store: Arc::new(store),
                source,
                writer,
                clock: Arc::new(SystemClock::new()),
            },
            history,
            settings,
            slot: Arc::new(Mutex::new(Slot::Idle)),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.deps.clock = clock;
        self
    }

    /// Starts capturing `locator` and returns the first folder id.
    ///
    /// `events.on_new_folder` fires for that folder before this returns.
    /// A folder created before the stream fails to open is left on disk.
    pub fn start(
        &self,
        locator: &str,
        events: impl CaptureEvents + 'static,
    ) -> Result<String, CaptureError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut slot = lock_slot(&self.slot);
            if !matches!(*slot, Slot::Idle) {
                log::warn!("Capture already running; stop it before starting another");
                return Err(CaptureError::AlreadyCapturing);
            }
            *slot = Slot::Starting {
                cancelled: cancelled.clone(),
            };
        }

        let Prepared {
            locator,
            folder,
            stream,
            rotated_at,
        } = match self.prepare(locator, &events) {
            Ok(prepared) => prepared,
            Err(e) => {
                log::error!("Failed to start capture: {e}");
                *lock_slot(&self.slot) = Slot::Idle;
                return Err(e);
            }
        };

        let handles = SessionHandles {
            cancelled,
            folder: Arc::new(Mutex::new(folder.clone())),
        };
        let capture_loop = CaptureLoop::new(
            locator.clone(),
            stream,
            self.deps.clone(),
            self.settings.clone(),
            Box::new(events),
            &handles,
            rotated_at,
        );
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        // Held across spawn so the loop cannot clear the slot before the
        // session is in it.
        let mut slot = lock_slot(&self.slot);
        let slot_ref = Arc::clone(&self.slot);
        let spawned = thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let exit = SessionExit { slot: slot_ref, id };
                capture_loop.run(move || drop(exit));
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to spawn capture thread: {e}");
                *slot = Slot::Idle;
                return Err(CaptureError::Spawn(e));
            }
        };

        log::info!("Capturing {locator} into {folder}");
        *slot = Slot::Live(LiveSession {
            id,
            locator,
            cancelled: handles.cancelled,
            folder: handles.folder,
            thread: Some(handle),
        });
        Ok(folder)
    }

    fn prepare(
        &self,
        raw: &str,
        events: &impl CaptureEvents,
    ) -> Result<Prepared, CaptureError> {
        let locator = StreamLocator::parse(raw, false)?;

        let folder = self.deps.store.create_folder(&self.deps.clock.local_now())?;
        let rotated_at = self.deps.clock.elapsed();
        events.on_new_folder(&folder);

        self.history.record(&locator);

        log::info!("Opening stream {locator}");
        let stream = self.deps.source.open(&locator, &self.settings.source)?;
        Ok(Prepared {
            locator,
            folder,
            stream,
            rotated_at,
        })
    }

    /// Cancels the running session and waits for its loop to exit.
    ///
    /// A no-op when nothing is running. Called from inside an event
    /// callback it only cancels; the loop exits after the callback returns.
    pub fn stop(&self) {
        let (handle, locator) = {
            let mut slot = lock_slot(&self.slot);
            match &mut *slot {
                Slot::Idle => {
                    log::debug!("Stop requested with no capture running");
                    return;
                }
                Slot::Starting { cancelled } => {
                    cancelled.store(true, Ordering::SeqCst);
                    return;
                }
                Slot::Live(session) => {
                    session.cancelled.store(true, Ordering::SeqCst);
                    (session.thread.take(), session.locator.clone())
                }
            }
        };

        let Some(handle) = handle else {
            // Another caller is already waiting on this session.
            return;
        };
        if handle.thread().id() == thread::current().id() {
            log::debug!("Stop requested from the capture thread for {locator}");
            return;
        }
        if handle.join().is_err() {
            log::error!("Capture thread for {locator} panicked");
        }
        log::info!("Stopped capturing {locator}");
    }

    pub fn is_capturing(&self) -> bool {
        !matches!(*lock_slot(&self.slot), Slot::Idle)
    }

    /// The folder frames are currently written to, if a session is live.
    pub fn current_folder(&self) -> Option<String> {
        match &*lock_slot(&self.slot) {
            Slot::Live(session) => Some(capture_loop::lock(&session.folder).clone()),
            _ => None,
        }
    }

    /// The address of the live session, if any.
    pub fn current_locator(&self) -> Option<StreamLocator> {
        match &*lock_slot(&self.slot) {
            Slot::Live(session) => Some(session.locator.clone()),
            _ => None,
        }
    }

    /// Capture folders, newest first. Listing failures yield an empty list.
    pub fn get_folders(&self) -> Vec<String> {
        self.deps.store.list_folders().unwrap_or_else(|e| {
            log::error!("Could not list capture folders: {e}");
            Vec::new()
        })
    }

    /// Images in `folder`, oldest first. Listing failures yield an empty list.
    pub fn get_images(&self, folder: &str) -> Vec<String> {
        self.deps.store.list_images(folder).unwrap_or_else(|e| {
            log::error!("Could not list images in {folder}: {e}");
            Vec::new()
        })
    }

    pub fn store(&self) -> &CaptureStore {
        &self.deps.store
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Frees the slot of session `id` when the capture thread is done with
/// it, whether the loop returns or unwinds.
struct SessionExit {
    slot: Arc<Mutex<Slot>>,
    id: u64,
}

impl Drop for SessionExit {
    fn drop(&mut self) {
        clear_session(&self.slot, self.id);
    }
}

/// Leaves a newer session alone.
fn clear_session(slot: &Mutex<Slot>, id: u64) {
    let mut slot = lock_slot(slot);
    if matches!(&*slot, Slot::Live(session) if session.id == id) {
        *slot = Slot::Idle;
    }
}
