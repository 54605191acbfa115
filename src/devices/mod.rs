// Device discovery and the OS MIDI subsystem boundary

#[cfg(target_os = "linux")]
pub mod alsa_seq;
pub mod portable;
pub mod watcher;

pub use watcher::{DeviceWatcher, WatchOutcome};

use std::fmt;
use std::time::Duration;

/// Error type for MIDI subsystem operations
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("ALSA sequencer error: {0}")]
    Alsa(String),

    #[error("MIDI client initialization failed: {0}")]
    Init(String),

    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("MIDI port not found: {0}")]
    PortNotFound(String),

    #[error("No queue is open")]
    NoQueue,

    #[error("Invalid name for MIDI subsystem: {0}")]
    InvalidName(#[from] std::ffi::NulError),
}

pub type Result<T> = std::result::Result<T, MidiError>;

/// A hardware MIDI input endpoint as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePort {
    /// Backend-specific address ("24:0" for ALSA, "midi-0" for midir)
    pub id: String,
    pub client_name: String,
    pub port_name: String,
}

impl fmt::Display for DevicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.port_name, self.client_name, self.id)
    }
}

/// Handle to an event queue owned by the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle(pub i32);

/// Handle to the input endpoint created for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputHandle(pub i32);

/// Tempo and resolution applied to a queue.
///
/// These only scale the OS tick clock; the recorded musical content is
/// expressed in ticks either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTempo {
    /// Microseconds per beat
    pub tempo_us: u32,
    pub ticks_per_beat: u16,
}

impl QueueTempo {
    pub fn from_bpm(bpm: u32, ticks_per_beat: u16) -> Self {
        Self {
            tempo_us: bpm_to_tempo(bpm),
            ticks_per_beat,
        }
    }

    /// Number of queue ticks elapsed after `elapsed` wall time
    pub fn ticks_for(&self, elapsed: Duration) -> u32 {
        let ticks = elapsed.as_micros() * self.ticks_per_beat as u128 / self.tempo_us.max(1) as u128;
        ticks.min(u32::MAX as u128) as u32
    }
}

/// Convert beats per minute to microseconds per beat
pub fn bpm_to_tempo(bpm: u32) -> u32 {
    60_000_000 / bpm.max(1)
}

/// A timestamped event read from the session queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMidiEvent {
    /// Absolute queue tick
    pub tick: u32,
    pub kind: RawEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Keyboard heartbeat, carries no musical content
    ActiveSensing,
    /// Anything else the device sent, described for diagnostics
    Other(String),
}

impl RawMidiEvent {
    pub fn is_active_sensing(&self) -> bool {
        matches!(self.kind, RawEventKind::ActiveSensing)
    }
}

/// Decode a raw MIDI message into an event kind
pub fn decode_message(msg: &[u8]) -> RawEventKind {
    let Some(&status) = msg.first() else {
        return RawEventKind::Other("empty message".into());
    };
    let channel = status & 0x0F;

    match status & 0xF0 {
        0x90 if msg.len() >= 3 => RawEventKind::NoteOn {
            channel,
            note: msg[1] & 0x7F,
            velocity: msg[2] & 0x7F,
        },
        0x80 if msg.len() >= 3 => RawEventKind::NoteOff {
            channel,
            note: msg[1] & 0x7F,
            velocity: msg[2] & 0x7F,
        },
        _ if status == 0xFE => RawEventKind::ActiveSensing,
        _ => RawEventKind::Other(format!("{:02X?}", msg)),
    }
}

/// Operations the recorder needs from an OS MIDI subsystem.
///
/// Mirrors a sequencer-style API: one client for the process lifetime,
/// with a queue and an input endpoint created per recording attempt.
pub trait Sequencer {
    /// Input ports capable of generic MIDI from hardware, in stable OS order
    fn input_ports(&self) -> Result<Vec<DevicePort>>;

    fn create_queue(&mut self, name: &str, tempo: QueueTempo) -> Result<QueueHandle>;

    fn start_queue(&mut self, queue: QueueHandle) -> Result<()>;

    /// Create an input endpoint that timestamps events in `queue` ticks
    fn create_input(&mut self, name: &str, queue: QueueHandle) -> Result<InputHandle>;

    fn connect_from(&mut self, input: InputHandle, port: &DevicePort) -> Result<()>;

    fn disconnect_from(&mut self, input: InputHandle, port: &DevicePort) -> Result<()>;

    /// Wait up to `timeout` for the next event. `Ok(None)` means nothing arrived.
    fn read_event(&mut self, timeout: Duration) -> Result<Option<RawMidiEvent>>;

    fn drain_output(&mut self) -> Result<()>;

    fn stop_queue(&mut self, queue: QueueHandle) -> Result<()>;

    fn close_queue(&mut self, queue: QueueHandle) -> Result<()>;

    fn delete_input(&mut self, input: InputHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_constant_matches_500_bpm() {
        let tempo = QueueTempo::from_bpm(500, 480);
        assert_eq!(tempo.tempo_us, 120_000);
        assert_eq!(tempo.ticks_per_beat, 480);
    }

    #[test]
    fn ticks_scale_with_tempo() {
        let tempo = QueueTempo::from_bpm(500, 480);
        // one beat = 120ms = 480 ticks
        assert_eq!(tempo.ticks_for(Duration::from_millis(120)), 480);
        assert_eq!(tempo.ticks_for(Duration::from_millis(30)), 120);
        assert_eq!(tempo.ticks_for(Duration::ZERO), 0);
    }

    #[test]
    fn decodes_note_and_sensing_messages() {
        assert_eq!(
            decode_message(&[0x91, 60, 80]),
            RawEventKind::NoteOn { channel: 1, note: 60, velocity: 80 }
        );
        assert_eq!(
            decode_message(&[0x80, 64, 10]),
            RawEventKind::NoteOff { channel: 0, note: 64, velocity: 10 }
        );
        assert_eq!(decode_message(&[0xFE]), RawEventKind::ActiveSensing);
        assert!(matches!(decode_message(&[0xB0, 64, 127]), RawEventKind::Other(_)));
        assert!(matches!(decode_message(&[]), RawEventKind::Other(_)));
    }

    #[test]
    fn truncated_note_is_not_a_note() {
        assert!(matches!(decode_message(&[0x90, 60]), RawEventKind::Other(_)));
    }
}
