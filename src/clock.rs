// Wall-clock access, monotonic time and blocking waits

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Source of "now" and of blocking sleeps.
///
/// Wall time only names things (session start, file names). Deadlines such
/// as the idle timeout and liveness throttling run on the monotonic
/// `instant`, so a stepped system clock cannot stall them. A manual clock
/// makes the whole loop deterministic.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;

    fn instant(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// The real local-time clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Local> {
        (**self).now()
    }

    fn instant(&self) -> Instant {
        (**self).instant()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// True once at least `window` has passed between `since` and `now`
pub fn elapsed_at_least(since: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(since) >= window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_boundary_is_inclusive() {
        let base = Instant::now();
        let window = Duration::from_secs(5);
        assert!(!elapsed_at_least(base, base + Duration::from_secs(4), window));
        assert!(elapsed_at_least(base, base + Duration::from_secs(5), window));
        assert!(elapsed_at_least(base, base + Duration::from_secs(60), window));
    }

    #[test]
    fn earlier_now_is_not_elapsed() {
        let base = Instant::now();
        assert!(!elapsed_at_least(base + Duration::from_secs(10), base, Duration::from_secs(1)));
    }
}
