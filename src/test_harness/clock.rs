use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

#[derive(Debug)]
struct ManualState {
    wall: DateTime<Local>,
    elapsed: Duration,
}

/// A clock that only moves when something sleeps on it.
///
/// Clones share the same time, so a test can hand one copy to the recorder
/// and another to the fake sequencer. Wall time can also be stepped on its
/// own, the way NTP corrects a board without a real-time clock.
#[derive(Debug, Clone)]
pub struct ManualClock {
    initial: DateTime<Local>,
    base: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(initial: DateTime<Local>) -> Self {
        Self {
            initial,
            base: Instant::now(),
            state: Arc::new(Mutex::new(ManualState {
                wall: initial,
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Start at a local wall-clock time
    pub fn starting_at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let initial = Local
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .earliest()
            .expect("valid local time");
        Self::new(initial)
    }

    pub fn initial(&self) -> DateTime<Local> {
        self.initial
    }

    /// Monotonic time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).expect("duration in range");
        let mut state = self.state.lock();
        state.wall += step;
        state.elapsed += duration;
    }

    /// Move wall time only; monotonic time is untouched
    pub fn step_wall_clock(&self, delta: chrono::Duration) {
        self.state.lock().wall += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.state.lock().wall
    }

    fn instant(&self) -> Instant {
        self.base + self.state.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
