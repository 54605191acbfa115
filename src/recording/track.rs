// In-memory track and the raw event -> SMF event conversion

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::devices::{RawEventKind, RawMidiEvent};

/// Largest delta a standard MIDI file can encode
const MAX_DELTA: u32 = (1 << 28) - 1;

/// A single-track performance, delta-time encoded.
///
/// Always starts with one tempo meta event at delta 0. The end-of-track
/// marker is only added when converting to a file.
#[derive(Debug, Clone)]
pub struct Track {
    events: Vec<TrackEvent<'static>>,
    tempo_us: u32,
    ticks_per_beat: u16,
}

impl Track {
    pub fn new(tempo_us: u32, ticks_per_beat: u16) -> Self {
        Self {
            events: vec![TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_us))),
            }],
            tempo_us,
            ticks_per_beat,
        }
    }

    pub fn events(&self) -> &[TrackEvent<'static>] {
        &self.events
    }

    pub fn tempo_us(&self) -> u32 {
        self.tempo_us
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    /// Number of note events, excluding the tempo header
    pub fn note_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { .. }))
            .count()
    }

    /// Total length in ticks
    pub fn duration_ticks(&self) -> u64 {
        self.events.iter().map(|e| e.delta.as_int() as u64).sum()
    }

    fn push_midi(&mut self, delta: u32, channel: u8, message: MidiMessage) {
        self.events.push(TrackEvent {
            delta: u28::from(delta),
            kind: TrackEventKind::Midi {
                channel: u4::from(channel & 0x0F),
                message,
            },
        });
    }

    /// Build a format 1 file holding this track
    pub fn to_smf(&self) -> Smf<'static> {
        let header = Header::new(Format::Parallel, Timing::Metrical(u15::from(self.ticks_per_beat)));
        let mut smf = Smf::new(header);

        let mut events = self.events.clone();
        events.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(events);

        smf
    }
}

/// Append one raw device event to `track`.
///
/// `prev_tick` is the absolute tick of the previously appended event.
/// Returns whether an event was appended; when it was not, the caller's
/// tick cursor must stay where it is.
pub fn append_event(track: &mut Track, prev_tick: u32, event: &RawMidiEvent) -> bool {
    let delta = delta_ticks(prev_tick, event.tick);

    match event.kind {
        RawEventKind::NoteOn { channel, note, velocity } if velocity > 0 => {
            track.push_midi(
                delta,
                channel,
                MidiMessage::NoteOn {
                    key: u7::from(note),
                    vel: u7::from(velocity),
                },
            );
            true
        }
        // Zero-velocity note-on is a note-off
        RawEventKind::NoteOn { channel, note, .. } => {
            track.push_midi(
                delta,
                channel,
                MidiMessage::NoteOff {
                    key: u7::from(note),
                    vel: u7::from(0),
                },
            );
            true
        }
        RawEventKind::NoteOff { channel, note, velocity } => {
            track.push_midi(
                delta,
                channel,
                MidiMessage::NoteOff {
                    key: u7::from(note),
                    vel: u7::from(velocity),
                },
            );
            true
        }
        RawEventKind::ActiveSensing => {
            log::debug!("Dropping active sensing at tick {}", event.tick);
            false
        }
        RawEventKind::Other(ref description) => {
            log::info!("Ignoring unsupported MIDI event type: {}", description);
            false
        }
    }
}

fn delta_ticks(prev_tick: u32, tick: u32) -> u32 {
    if tick < prev_tick {
        log::warn!("Event tick {} precedes cursor {}, using delta 0", tick, prev_tick);
        return 0;
    }
    (tick - prev_tick).min(MAX_DELTA)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(note: u8, velocity: u8, tick: u32) -> RawMidiEvent {
        RawMidiEvent {
            tick,
            kind: RawEventKind::NoteOn { channel: 0, note, velocity },
        }
    }

    fn note_off(note: u8, velocity: u8, tick: u32) -> RawMidiEvent {
        RawMidiEvent {
            tick,
            kind: RawEventKind::NoteOff { channel: 0, note, velocity },
        }
    }

    /// Feed events the way the recorder does: cursor moves only on append
    fn record(events: &[RawMidiEvent]) -> Track {
        let mut track = Track::new(120_000, 480);
        let mut cursor = events.first().map(|e| e.tick).unwrap_or(0);
        for event in events {
            if append_event(&mut track, cursor, event) {
                cursor = event.tick;
            }
        }
        track
    }

    #[test]
    fn new_track_has_tempo_header() {
        let track = Track::new(120_000, 480);
        assert_eq!(track.events().len(), 1);
        assert_eq!(track.events()[0].delta.as_int(), 0);
        assert_eq!(
            track.events()[0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::from(120_000)))
        );
        assert_eq!(track.note_count(), 0);
    }

    #[test]
    fn zero_velocity_note_on_becomes_note_off() {
        for velocity in 0..=127u8 {
            let mut track = Track::new(120_000, 480);
            assert!(append_event(&mut track, 0, &note_on(60, velocity, 0)));

            match track.events()[1].kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { vel, .. }, .. } => {
                    assert!(velocity > 0);
                    assert_eq!(vel.as_int(), velocity);
                }
                TrackEventKind::Midi { message: MidiMessage::NoteOff { vel, .. }, .. } => {
                    assert_eq!(velocity, 0);
                    assert_eq!(vel.as_int(), 0);
                }
                ref other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn explicit_note_off_keeps_release_velocity() {
        let track = record(&[note_on(64, 90, 10), note_off(64, 33, 250)]);
        assert_eq!(
            track.events()[2].kind,
            TrackEventKind::Midi {
                channel: u4::from(0),
                message: MidiMessage::NoteOff { key: u7::from(64), vel: u7::from(33) },
            }
        );
        assert_eq!(track.events()[2].delta.as_int(), 240);
    }

    #[test]
    fn deltas_sum_to_tick_offsets() {
        let ticks = [1000u32, 1000, 1120, 1500, 1500, 2400, 9000];
        let events: Vec<_> = ticks
            .iter()
            .enumerate()
            .map(|(i, &t)| if i % 2 == 0 { note_on(60 + i as u8, 70, t) } else { note_off(60, 0, t) })
            .collect();

        let track = record(&events);
        let mut sum = 0u32;
        // skip tempo header
        for (event, &tick) in track.events()[1..].iter().zip(ticks.iter()) {
            sum += event.delta.as_int();
            assert_eq!(sum, tick - ticks[0]);
        }
        assert_eq!(track.duration_ticks(), (9000 - 1000) as u64);
    }

    #[test]
    fn unsupported_events_leave_track_untouched() {
        let mut track = Track::new(120_000, 480);
        let other = RawMidiEvent { tick: 50, kind: RawEventKind::Other("Controller".into()) };
        let sensing = RawMidiEvent { tick: 60, kind: RawEventKind::ActiveSensing };

        assert!(!append_event(&mut track, 0, &other));
        assert!(!append_event(&mut track, 0, &sensing));
        assert_eq!(track.events().len(), 1);
    }

    #[test]
    fn unsupported_event_does_not_move_cursor() {
        let events = [
            note_on(60, 80, 0),
            RawMidiEvent { tick: 100, kind: RawEventKind::Other("PitchBend".into()) },
            note_off(60, 0, 240),
        ];
        let track = record(&events);
        assert_eq!(track.note_count(), 2);
        assert_eq!(track.events()[2].delta.as_int(), 240);
    }

    #[test]
    fn channel_is_preserved() {
        let mut track = Track::new(120_000, 480);
        let event = RawMidiEvent {
            tick: 0,
            kind: RawEventKind::NoteOn { channel: 9, note: 36, velocity: 100 },
        };
        append_event(&mut track, 0, &event);
        assert!(matches!(
            track.events()[1].kind,
            TrackEventKind::Midi { channel, .. } if channel.as_int() == 9
        ));
    }

    #[test]
    fn out_of_order_tick_clamps_to_zero() {
        let mut track = Track::new(120_000, 480);
        append_event(&mut track, 500, &note_on(60, 80, 100));
        assert_eq!(track.events()[1].delta.as_int(), 0);
    }

    #[test]
    fn smf_ends_with_end_of_track() {
        let track = record(&[note_on(60, 80, 0), note_on(60, 0, 120)]);
        let smf = track.to_smf();

        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(480)));
        assert_eq!(smf.tracks.len(), 1);
        let events = &smf.tracks[0];
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].kind, TrackEventKind::Meta(MetaMessage::EndOfTrack));
        // the in-memory track is unchanged
        assert_eq!(track.events().len(), 3);
    }
}
