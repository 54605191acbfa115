// Device discovery loop: wait for a keyboard, record, repeat

use std::time::Duration;

use super::Sequencer;
use crate::clock::Clock;
use crate::config::Config;
use crate::recording::{Recorder, RecorderError, SessionSummary};

/// Result of one discovery cycle
#[derive(Debug)]
pub enum WatchOutcome {
    /// No matching port; the watcher slept before returning
    NoDevice,
    /// A session ran to completion on the first port found
    Recorded(SessionSummary),
}

/// Polls the MIDI subsystem for an input port and hands it to the recorder.
///
/// Ending a session always returns here, which is what makes unplugging and
/// replugging the keyboard work without restarting the process.
#[derive(Debug, Clone)]
pub struct DeviceWatcher {
    check_interval: Duration,
}

impl DeviceWatcher {
    pub fn new(check_interval: Duration) -> Self {
        Self { check_interval }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.device_check_interval())
    }

    /// Scan once. With no port, sleep and report liveness; otherwise record
    /// a full session on the first port in OS order.
    pub fn poll_once<S: Sequencer, C: Clock>(
        &self,
        seq: &mut S,
        recorder: &mut Recorder<C>,
    ) -> Result<WatchOutcome, RecorderError> {
        let ports = seq.input_ports()?;
        for (i, port) in ports.iter().enumerate() {
            log::info!("{}. {}", i + 1, port);
        }

        let Some(port) = ports.into_iter().next() else {
            log::debug!("No MIDI input ports found, waiting {:?}", self.check_interval);
            recorder.clock().sleep(self.check_interval);
            recorder.heartbeat();
            return Ok(WatchOutcome::NoDevice);
        };

        let summary = recorder.record(seq, &port)?;
        log::info!("Restarting...");
        Ok(WatchOutcome::Recorded(summary))
    }

    /// One cycle with the error boundary: a failed session is logged, the
    /// watcher backs off for one check interval and discovery resumes.
    pub fn cycle<S: Sequencer, C: Clock>(&self, seq: &mut S, recorder: &mut Recorder<C>) -> Option<WatchOutcome> {
        match self.poll_once(seq, recorder) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::error!("Recording failed, rescanning devices in {:?}: {}", self.check_interval, e);
                recorder.clock().sleep(self.check_interval);
                recorder.heartbeat();
                None
            }
        }
    }

    pub fn run<S: Sequencer, C: Clock>(&self, seq: &mut S, recorder: &mut Recorder<C>) -> ! {
        loop {
            self.cycle(seq, recorder);
        }
    }
}
