// One recording attempt against one input port

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::track::{append_event, Track};
use super::Result;
use crate::clock::{elapsed_at_least, Clock};
use crate::config::Config;
use crate::devices::{DevicePort, InputHandle, QueueHandle, QueueTempo, RawMidiEvent, Sequencer};
use crate::liveness::LivenessReporter;
use crate::session::FilePersister;

const QUEUE_NAME: &str = "capture_queue";
const INPUT_NAME: &str = "input";

/// Timing parameters for a recording session
#[derive(Debug, Clone, Copy)]
pub struct RecorderSettings {
    /// Silence after the last event that ends a session
    pub idle_timeout: Duration,
    /// Upper bound on one blocking read
    pub read_timeout: Duration,
    pub tempo: QueueTempo,
}

impl From<&Config> for RecorderSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            read_timeout: config.read_timeout(),
            tempo: config.queue_tempo(),
        }
    }
}

/// What happened during one session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub port: DevicePort,
    /// Wall-clock time of the first substantive event, if any arrived
    pub started_at: Option<DateTime<Local>>,
    pub saved_to: Option<PathBuf>,
    pub events_recorded: usize,
}

/// State accumulated while the session loop runs
#[derive(Default)]
struct Capture {
    track: Option<Track>,
    started_at: Option<DateTime<Local>>,
    /// Monotonic time of the last non-sensing event
    last_activity: Option<Instant>,
    /// Absolute tick of the last appended event
    cursor: u32,
    events_recorded: usize,
}

/// OS resources acquired so far, released in reverse by `teardown`
struct SessionResources<'p> {
    port: &'p DevicePort,
    queue: Option<QueueHandle>,
    queue_started: bool,
    input: Option<InputHandle>,
    connected: bool,
}

impl<'p> SessionResources<'p> {
    fn new(port: &'p DevicePort) -> Self {
        Self {
            port,
            queue: None,
            queue_started: false,
            input: None,
            connected: false,
        }
    }
}

/// Records performances from one port at a time and saves each one.
///
/// Owns the liveness reporter so the heartbeat keeps running while the
/// session loop blocks on reads.
pub struct Recorder<C: Clock> {
    settings: RecorderSettings,
    clock: C,
    liveness: LivenessReporter,
    persister: FilePersister,
}

impl<C: Clock> Recorder<C> {
    pub fn new(config: &Config, clock: C) -> Self {
        Self::from_parts(
            RecorderSettings::from(config),
            clock,
            LivenessReporter::new(config.pid_file.clone(), config.pid_write_interval()),
            FilePersister::new(config.recording_path.clone(), config.file_prefix.clone()),
        )
    }

    pub fn from_parts(
        settings: RecorderSettings,
        clock: C,
        liveness: LivenessReporter,
        persister: FilePersister,
    ) -> Self {
        Self {
            settings,
            clock,
            liveness,
            persister,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn liveness(&self) -> &LivenessReporter {
        &self.liveness
    }

    /// Liveness hook, throttled by the reporter
    pub fn heartbeat(&mut self) {
        let now = self.clock.instant();
        self.liveness.tick(now);
    }

    /// Run one full session on `port`.
    ///
    /// Returns once the performance has been followed by `idle_timeout` of
    /// silence. Whatever was captured is saved even when the loop fails, and
    /// the queue and endpoint are always released before returning.
    pub fn record<S: Sequencer>(&mut self, seq: &mut S, port: &DevicePort) -> Result<SessionSummary> {
        let mut resources = SessionResources::new(port);
        let mut capture = Capture::default();

        let outcome = self
            .open(seq, &mut resources)
            .and_then(|()| self.capture(seq, &mut capture));

        let saved = self.persist(&capture);
        teardown(seq, &resources);

        let saved_to = match (outcome, saved) {
            (Ok(()), saved) => saved?,
            (Err(e), Err(save_err)) => {
                log::error!("Failed to save partial recording: {}", save_err);
                return Err(e);
            }
            (Err(e), Ok(_)) => return Err(e),
        };

        Ok(SessionSummary {
            port: port.clone(),
            started_at: capture.started_at,
            saved_to,
            events_recorded: capture.events_recorded,
        })
    }

    fn open<S: Sequencer>(&self, seq: &mut S, resources: &mut SessionResources<'_>) -> Result<()> {
        let queue = seq.create_queue(QUEUE_NAME, self.settings.tempo)?;
        resources.queue = Some(queue);

        seq.start_queue(queue)?;
        resources.queue_started = true;

        let input = seq.create_input(INPUT_NAME, queue)?;
        resources.input = Some(input);

        seq.connect_from(input, resources.port)?;
        resources.connected = true;

        log::info!("Listening on port {}", resources.port);
        Ok(())
    }

    fn capture<S: Sequencer>(&mut self, seq: &mut S, capture: &mut Capture) -> Result<()> {
        loop {
            if let Some(last) = capture.last_activity {
                if elapsed_at_least(last, self.clock.instant(), self.settings.idle_timeout) {
                    log::info!(
                        "No input for {:?}, session ended with {} events",
                        self.settings.idle_timeout,
                        capture.events_recorded
                    );
                    return Ok(());
                }
            }

            if let Some(event) = seq.read_event(self.settings.read_timeout)? {
                self.handle_event(seq, capture, event)?;
            }

            self.heartbeat();
        }
    }

    fn handle_event<S: Sequencer>(&mut self, seq: &mut S, capture: &mut Capture, event: RawMidiEvent) -> Result<()> {
        if event.is_active_sensing() {
            return Ok(());
        }

        if capture.track.is_none() {
            seq.drain_output()?;
            let now = self.clock.now();
            capture.started_at = Some(now);
            capture.track = Some(Track::new(self.settings.tempo.tempo_us, self.settings.tempo.ticks_per_beat));
            // the first event anchors the track, so it lands at delta 0
            capture.cursor = event.tick;
            log::info!("Session started at {}", now.format("%Y-%m-%d %H:%M:%S"));
        }

        if let Some(track) = capture.track.as_mut() {
            if append_event(track, capture.cursor, &event) {
                capture.cursor = event.tick;
                capture.events_recorded += 1;
            }
        }

        capture.last_activity = Some(self.clock.instant());
        Ok(())
    }

    fn persist(&self, capture: &Capture) -> std::result::Result<Option<PathBuf>, crate::session::StorageError> {
        match (&capture.track, &capture.started_at) {
            (Some(track), Some(started_at)) => self.persister.save(track, started_at).map(Some),
            _ => Ok(None),
        }
    }
}

fn best_effort(step: &str, result: crate::devices::Result<()>) {
    if let Err(e) = result {
        log::warn!("Cleanup step '{}' failed (continuing): {}", step, e);
    }
}

/// Release session resources in order; a failing step never skips the next
fn teardown<S: Sequencer>(seq: &mut S, resources: &SessionResources<'_>) {
    if let (Some(input), true) = (resources.input, resources.connected) {
        best_effort("disconnect from port", seq.disconnect_from(input, resources.port));
    }

    if let Some(queue) = resources.queue {
        if resources.queue_started {
            let stopped = seq.stop_queue(queue).and_then(|()| seq.drain_output());
            best_effort("stop queue", stopped);
        }
        best_effort("close queue", seq.close_queue(queue));
    }

    if let Some(input) = resources.input {
        best_effort("delete input", seq.delete_input(input));
    }
}
