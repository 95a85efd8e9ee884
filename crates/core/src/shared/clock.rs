use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// Time source for the capture loop.
///
/// Rotation is driven by `elapsed`, names by `local_now`. Injected so tests
/// can move time without waiting a minute.
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn elapsed(&self) -> Duration;

    /// Local wall-clock time used for folder and frame names.
    fn local_now(&self) -> DateTime<Local>;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn local_now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
