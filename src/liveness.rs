// Liveness reporting for an external supervisor

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::clock::{elapsed_at_least, Clock};

/// Rewrites a PID file at most once per interval.
///
/// This is a heartbeat for whoever supervises the process, not a lock.
#[derive(Debug)]
pub struct LivenessReporter {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    pid: u32,
}

impl LivenessReporter {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self::with_pid(path, interval, std::process::id())
    }

    pub fn with_pid(path: PathBuf, interval: Duration, pid: u32) -> Self {
        Self {
            path,
            interval,
            last_write: None,
            pid,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_write(&self) -> Option<Instant> {
        self.last_write
    }

    /// Write the PID if the interval has elapsed since the last write.
    /// Returns whether the file was written.
    pub fn maybe_write(&mut self, now: Instant) -> std::io::Result<bool> {
        if let Some(last) = self.last_write {
            if !elapsed_at_least(last, now, self.interval) {
                return Ok(false);
            }
        }

        std::fs::write(&self.path, self.pid.to_string())?;
        self.last_write = Some(now);
        Ok(true)
    }

    /// Like `maybe_write`, but a failed write is only logged
    pub fn tick(&mut self, now: Instant) {
        if let Err(e) = self.maybe_write(now) {
            log::warn!("Failed to write PID file {}: {}", self.path.display(), e);
        }
    }
}

/// Block until `dir` exists, checking once per `poll`.
///
/// Runs before the MIDI client is opened; waits forever.
pub fn wait_for_directory<C: Clock>(dir: &Path, poll: Duration, clock: &C) -> u32 {
    let mut waits = 0;
    while !dir.exists() {
        log::info!("Waiting {:?} for {} to be mounted", poll, dir.display());
        clock.sleep(poll);
        waits += 1;
    }
    waits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::ManualClock;
    use chrono::{DateTime, Local};
    use std::cell::Cell;

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn first_call_always_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midicatcher.pid");
        let mut reporter = LivenessReporter::with_pid(path.clone(), Duration::from_secs(5), 4242);
        let base = Instant::now();

        assert!(reporter.maybe_write(base).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242");
        assert_eq!(reporter.last_write(), Some(base));
    }

    #[test]
    fn writes_at_most_once_per_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midicatcher.pid");
        let mut reporter = LivenessReporter::with_pid(path.clone(), Duration::from_secs(5), 7);
        let base = Instant::now();

        let mut writes = Vec::new();
        // called every half second for 20 seconds
        for half_secs in 0..40 {
            let now = at(base, half_secs * 500);
            if reporter.maybe_write(now).unwrap() {
                writes.push(now);
            }
        }

        assert_eq!(writes.len(), 4);
        for pair in writes.windows(2) {
            assert!(elapsed_at_least(pair[0], pair[1], Duration::from_secs(5)));
        }
    }

    #[test]
    fn external_overwrite_is_repaired_after_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midicatcher.pid");
        let mut reporter = LivenessReporter::with_pid(path.clone(), Duration::from_secs(5), 99);
        let base = Instant::now();

        reporter.maybe_write(base).unwrap();
        std::fs::write(&path, "stale").unwrap();
        assert!(!reporter.maybe_write(at(base, 3_000)).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "stale");
        assert!(reporter.maybe_write(at(base, 5_000)).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "99");
    }

    #[test]
    fn failed_write_does_not_advance_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("midicatcher.pid");
        let mut reporter = LivenessReporter::with_pid(path, Duration::from_secs(5), 1);
        let base = Instant::now();

        assert!(reporter.maybe_write(base).is_err());
        assert_eq!(reporter.last_write(), None);
        reporter.tick(at(base, 1_000));
    }

    #[test]
    fn existing_directory_does_not_wait() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_at(2024, 2, 1, 6, 0, 0);
        assert_eq!(wait_for_directory(dir.path(), Duration::from_secs(1), &clock), 0);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    /// Mounts `dir` during the `mount_on`-th sleep
    struct MountingClock {
        inner: ManualClock,
        dir: PathBuf,
        sleeps: Cell<u32>,
        mount_on: u32,
    }

    impl Clock for MountingClock {
        fn now(&self) -> DateTime<Local> {
            self.inner.now()
        }

        fn instant(&self) -> Instant {
            self.inner.instant()
        }

        fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration);
            self.sleeps.set(self.sleeps.get() + 1);
            if self.sleeps.get() == self.mount_on {
                std::fs::create_dir(&self.dir).unwrap();
            }
        }
    }

    #[test]
    fn waits_one_poll_per_check_until_mounted() {
        let root = tempfile::tempdir().unwrap();
        let clock = MountingClock {
            inner: ManualClock::starting_at(2024, 2, 1, 6, 0, 0),
            dir: root.path().join("run"),
            sleeps: Cell::new(0),
            mount_on: 3,
        };

        let waits = wait_for_directory(&clock.dir, Duration::from_secs(1), &clock);

        assert_eq!(waits, 3);
        assert_eq!(clock.sleeps.get(), 3);
        assert_eq!(clock.inner.elapsed(), Duration::from_secs(3));
        assert!(clock.dir.is_dir());
    }
}
