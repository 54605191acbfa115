// Deterministic doubles for the clock and the OS MIDI subsystem, plus
// scripted end-to-end scenarios shared by unit tests and the
// integration_tests binary.

pub mod clock;
pub mod fake;
pub mod runner;
pub mod validators;

pub use clock::ManualClock;
pub use fake::{FakeSequencer, Step};

use std::path::Path;
use std::time::Duration;

use crate::devices::{DevicePort, QueueTempo, RawEventKind, RawMidiEvent};
use crate::liveness::LivenessReporter;
use crate::recording::session::RecorderSettings;
use crate::recording::Recorder;
use crate::session::FilePersister;

pub fn note_on(note: u8, velocity: u8, tick: u32) -> RawMidiEvent {
    RawMidiEvent {
        tick,
        kind: RawEventKind::NoteOn { channel: 0, note, velocity },
    }
}

pub fn note_off(note: u8, velocity: u8, tick: u32) -> RawMidiEvent {
    RawMidiEvent {
        tick,
        kind: RawEventKind::NoteOff { channel: 0, note, velocity },
    }
}

pub fn port(id: &str) -> DevicePort {
    DevicePort {
        id: id.to_string(),
        client_name: "Digital Piano".to_string(),
        port_name: "Digital Piano MIDI 1".to_string(),
    }
}

/// Recorder with the production timings, writing under `root`
pub fn recorder_in(root: &Path, clock: ManualClock) -> Recorder<ManualClock> {
    let settings = RecorderSettings {
        idle_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(1),
        tempo: QueueTempo::from_bpm(500, 480),
    };
    Recorder::from_parts(
        settings,
        clock,
        LivenessReporter::new(root.join("midicatcher.pid"), Duration::from_secs(5)),
        FilePersister::new(root.to_path_buf(), "piano_"),
    )
}
