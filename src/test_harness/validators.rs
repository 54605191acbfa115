use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

// ── MIDI validation ──────────────────────────────────────────────────

/// A note event as it appears in a saved file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedNote {
    On { key: u8, vel: u8, delta: u32 },
    Off { key: u8, vel: u8, delta: u32 },
}

#[derive(Debug)]
pub struct MidiValidation {
    pub ticks_per_beat: u16,
    pub tempo_us: u32,
    pub notes: Vec<SavedNote>,
    pub total_ticks: u64,
}

/// Parse a recorded file and check the layout every recording must have:
/// format 1, one track, tempo meta first, end-of-track last.
pub fn validate_midi(path: &Path) -> Result<MidiValidation, String> {
    let data = std::fs::read(path).map_err(|e| format!("Failed to read MIDI file: {}", e))?;
    let smf = Smf::parse(&data).map_err(|e| format!("Invalid MIDI file: {}", e))?;

    if smf.header.format != Format::Parallel {
        return Err(format!("Unexpected MIDI format {:?}", smf.header.format));
    }
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        other => return Err(format!("Unexpected timing {:?}", other)),
    };
    if smf.tracks.len() != 1 {
        return Err(format!("Expected 1 track, found {}", smf.tracks.len()));
    }

    let track = &smf.tracks[0];
    let tempo_us = match track.first().map(|e| (e.delta.as_int(), e.kind)) {
        Some((0, TrackEventKind::Meta(MetaMessage::Tempo(t)))) => t.as_int(),
        other => return Err(format!("First event is not a tempo at delta 0: {:?}", other)),
    };
    match track.last().map(|e| e.kind) {
        Some(TrackEventKind::Meta(MetaMessage::EndOfTrack)) => {}
        other => return Err(format!("Track does not end with end-of-track: {:?}", other)),
    }

    let mut notes = Vec::new();
    let mut total_ticks = 0u64;
    for event in &track[1..track.len() - 1] {
        let delta = event.delta.as_int();
        total_ticks += delta as u64;
        match event.kind {
            TrackEventKind::Midi { message: MidiMessage::NoteOn { key, vel }, .. } => {
                notes.push(SavedNote::On { key: key.as_int(), vel: vel.as_int(), delta })
            }
            TrackEventKind::Midi { message: MidiMessage::NoteOff { key, vel }, .. } => {
                notes.push(SavedNote::Off { key: key.as_int(), vel: vel.as_int(), delta })
            }
            other => return Err(format!("Unexpected event in recording: {:?}", other)),
        }
    }

    Ok(MidiValidation {
        ticks_per_beat,
        tempo_us,
        notes,
        total_ticks,
    })
}

/// Every `.mid` file below `root`, sorted
pub fn recorded_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(days) = std::fs::read_dir(root) else {
        return files;
    };
    for day in days.flatten() {
        if !day.path().is_dir() {
            continue;
        }
        if let Ok(entries) = std::fs::read_dir(day.path()) {
            files.extend(
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.extension().map(|x| x == "mid").unwrap_or(false)),
            );
        }
    }
    files.sort();
    files
}
