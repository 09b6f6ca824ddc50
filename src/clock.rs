//! Time sources for a detection session.
//!
//! Two readings are needed: a monotonic elapsed duration (for belt position)
//! and a local wall-clock time (for event timestamps). Both come from the
//! same `Clock` so a session sees one consistent notion of "now".

use chrono::{Local, NaiveDateTime};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary, fixed origin.
    fn elapsed(&self) -> Duration;

    /// Local wall-clock time.
    fn wall_now(&self) -> NaiveDateTime;
}

/// Production clock backed by `Instant` and the local timezone.
#[derive(Debug)]
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

    fn wall_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Wall time advances in step with the
/// monotonic reading.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: NaiveDateTime,
}

impl ManualClock {
    pub fn new(wall_start: NaiveDateTime) -> Self {
        Self {
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall: wall_start,
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += by;
        // chrono::Duration::from_std only fails beyond ~292 billion years.
        if let Ok(delta) = chrono::Duration::from_std(by) {
            state.wall += delta;
        }
    }

    pub fn advance_secs_f64(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).elapsed
    }

    fn wall_now(&self) -> NaiveDateTime {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).wall
    }
}
