//! Stubs shared by the capture tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeZone};
use crossbeam_channel::Receiver;

use crate::capture::capture_events::CaptureEvent;
use crate::history::history_store::{HistoryEntry, HistoryError, HistoryStore};
use crate::shared::clock::Clock;
use crate::shared::frame::Frame;
use crate::shared::stream_locator::StreamLocator;
use crate::storage::naming;
use crate::video::domain::image_writer::{ImageWriter, WriteError};
use crate::video::domain::video_source::{
    ReadError, SourceConfig, SourceError, VideoSource, VideoStream,
};

/// What the next read of a scripted stream does. Once the script runs out
/// every read briefly idles and returns an empty frame.
#[derive(Clone, Debug)]
pub enum ReadStep {
    Frame,
    Empty,
    Fail,
    /// Blocks for the given time, then fails.
    Block(Duration),
    /// Blocks until `ScriptedSource::open_gate`, then fails.
    Gated,
}

const IDLE_READ: Duration = Duration::from_millis(5);
const GATE_LIMIT: Duration = Duration::from_secs(5);

/// A video source whose streams all consume one shared script, so a
/// reconnected stream carries on where the previous one stopped.
pub struct ScriptedSource {
    script: Arc<Mutex<VecDeque<ReadStep>>>,
    gate: Arc<AtomicBool>,
    /// Successful opens still allowed; `None` is unlimited.
    open_limit: Mutex<Option<usize>>,
    opens: AtomicUsize,
    reads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(script: Vec<ReadStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            gate: Arc::new(AtomicBool::new(false)),
            open_limit: Mutex::new(None),
            opens: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&self, steps: Vec<ReadStep>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn set_open_limit(&self, limit: Option<usize>) {
        *self.open_limit.lock().unwrap() = limit;
    }

    pub fn open_gate(&self) {
        self.gate.store(true, Ordering::SeqCst);
    }

    /// Open attempts, successful or not.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Reads begun on any stream, counted on entry.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl VideoSource for ScriptedSource {
    fn open(
        &self,
        locator: &StreamLocator,
        _config: &SourceConfig,
    ) -> Result<Box<dyn VideoStream>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let mut limit = self.open_limit.lock().unwrap();
        match *limit {
            Some(0) => {
                return Err(SourceError::Open {
                    locator: locator.to_string(),
                    reason: "connection refused".into(),
                })
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        Ok(Box::new(ScriptedStream {
            script: self.script.clone(),
            gate: self.gate.clone(),
            reads: self.reads.clone(),
            releases: self.releases.clone(),
            released: false,
            index: 0,
        }))
    }
}

struct ScriptedStream {
    script: Arc<Mutex<VecDeque<ReadStep>>>,
    gate: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    released: bool,
    index: usize,
}

impl VideoStream for ScriptedStream {
    fn read(&mut self) -> Result<Frame, ReadError> {
        if self.released {
            return Err(ReadError::Released);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        self.index += 1;
        match step {
            Some(ReadStep::Frame) => Ok(solid_frame(self.index)),
            Some(ReadStep::Empty) => Ok(Frame::empty(self.index)),
            Some(ReadStep::Fail) => Err(ReadError::Timeout(Duration::from_millis(10))),
            Some(ReadStep::Block(duration)) => {
                thread::sleep(duration);
                Err(ReadError::Timeout(duration))
            }
            Some(ReadStep::Gated) => {
                let gate = self.gate.clone();
                wait_until(GATE_LIMIT, move || gate.load(Ordering::SeqCst));
                Err(ReadError::EndOfStream)
            }
            None => {
                thread::sleep(IDLE_READ);
                Ok(Frame::empty(self.index))
            }
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn solid_frame(index: usize) -> Frame {
    Frame::new(vec![128; 8 * 8 * 3], 8, 8, index)
}

/// Remembers every write instead of touching the filesystem.
pub struct RecordingWriter {
    written: Mutex<Vec<(PathBuf, Option<(u32, u32)>)>>,
    fail: AtomicBool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<(PathBuf, Option<(u32, u32)>)> {
        self.written.lock().unwrap().clone()
    }
}

impl ImageWriter for RecordingWriter {
    fn write(
        &self,
        path: &Path,
        _frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), WriteError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("disk full".into());
        }
        self.written
            .lock()
            .unwrap()
            .push((path.to_path_buf(), size));
        Ok(())
    }
}

pub struct PanickingWriter;

impl ImageWriter for PanickingWriter {
    fn write(
        &self,
        _path: &Path,
        _frame: &Frame,
        _size: Option<(u32, u32)>,
    ) -> Result<(), WriteError> {
        panic!("writer exploded");
    }
}

pub struct RecordingHistory {
    recorded: Mutex<Vec<String>>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }
}

impl HistoryStore for RecordingHistory {
    fn record(&self, locator: &StreamLocator) {
        self.recorded.lock().unwrap().push(locator.to_string());
    }

    fn entries(&self) -> Vec<HistoryEntry> {
        Vec::new()
    }

    fn remove(&self, _url: &str) -> Result<bool, HistoryError> {
        Ok(false)
    }
}

/// Time stands still until `advance` is called. `sleep` yields for a
/// millisecond of real time so loops under test still make progress.
pub struct ManualClock {
    base: DateTime<Local>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Local.with_ymd_and_hms(2024, 3, 15, 9, 41, 30).unwrap(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    /// Folder name for the clock's current time.
    pub fn folder_name(&self) -> String {
        naming::folder_name(&self.local_now())
    }

    pub fn frame_filename(&self, extension: &str) -> String {
        naming::frame_filename(&self.local_now(), extension)
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    fn local_now(&self) -> DateTime<Local> {
        self.base + chrono::Duration::from_std(self.elapsed()).unwrap()
    }

    fn sleep(&self, _duration: Duration) {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Receives events until `done` holds for everything received so far.
/// Panics with the events seen if that takes longer than `timeout`.
pub fn collect_until(
    rx: &Receiver<CaptureEvent>,
    timeout: Duration,
    done: impl Fn(&[CaptureEvent]) -> bool,
) -> Vec<CaptureEvent> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) => {
                seen.push(event);
                if done(&seen) {
                    return seen;
                }
            }
            Err(_) => panic!("timed out waiting for capture events; saw {seen:?}"),
        }
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
