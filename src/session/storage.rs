// Recording folder layout and MIDI file persistence

use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Result, StorageError};
use crate::recording::Track;

/// Date folder name, one per calendar day
const DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp embedded in every file name, second granularity
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";
const MIDI_EXTENSION: &str = "mid";

/// Writes finished performances as `<root>/<date>/<prefix><timestamp>.mid`
#[derive(Debug, Clone)]
pub struct FilePersister {
    root: PathBuf,
    prefix: String,
}

impl FilePersister {
    pub fn new(root: PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            root,
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every recording started on the same local day as `start`
    pub fn session_dir(&self, start: &DateTime<Local>) -> PathBuf {
        self.root.join(start.format(DATE_FORMAT).to_string())
    }

    pub fn file_name(&self, start: &DateTime<Local>) -> String {
        format!(
            "{}{}.{}",
            self.prefix,
            start.format(TIMESTAMP_FORMAT),
            MIDI_EXTENSION
        )
    }

    /// Full destination path for a session started at `start`
    pub fn destination(&self, start: &DateTime<Local>) -> PathBuf {
        self.session_dir(start).join(self.file_name(start))
    }

    /// Create the date folder (one level only) and write the track.
    ///
    /// A file from a session that started in the same second is overwritten.
    pub fn save(&self, track: &Track, start: &DateTime<Local>) -> Result<PathBuf> {
        if !self.root.is_dir() {
            return Err(StorageError::RootMissing(self.root.clone()));
        }

        let dir = self.session_dir(start);
        match std::fs::create_dir(&dir) {
            Ok(()) => log::debug!("Created recording folder {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(StorageError::Io { path: dir, source: e }),
        }

        let path = dir.join(self.file_name(start));
        track
            .to_smf()
            .save(&path)
            .map_err(|e| StorageError::Io { path: path.clone(), source: e })?;

        log::info!("Saved midi to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{RawEventKind, RawMidiEvent};
    use crate::recording::append_event;
    use chrono::TimeZone;
    use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 21, 5, 7).unwrap()
    }

    fn sample_track() -> Track {
        let mut track = Track::new(120_000, 480);
        let on = RawMidiEvent { tick: 0, kind: RawEventKind::NoteOn { channel: 0, note: 60, velocity: 80 } };
        let off = RawMidiEvent { tick: 120, kind: RawEventKind::NoteOn { channel: 0, note: 60, velocity: 0 } };
        append_event(&mut track, 0, &on);
        append_event(&mut track, 0, &off);
        track
    }

    #[test]
    fn path_layout_uses_local_date_and_second() {
        let persister = FilePersister::new(PathBuf::from("/recordings"), "piano_");
        assert_eq!(
            persister.destination(&start()),
            PathBuf::from("/recordings/2024-03-09/piano_2024-03-09_21:05:07.mid")
        );
    }

    #[test]
    fn custom_prefix() {
        let persister = FilePersister::new(PathBuf::from("/r"), "organ_");
        assert_eq!(persister.file_name(&start()), "organ_2024-03-09_21:05:07.mid");
    }

    #[test]
    fn save_creates_date_folder_and_valid_file() {
        let root = tempfile::tempdir().unwrap();
        let persister = FilePersister::new(root.path().to_path_buf(), "piano_");

        let path = persister.save(&sample_track(), &start()).unwrap();
        assert_eq!(path, root.path().join("2024-03-09").join("piano_2024-03-09_21:05:07.mid"));

        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);

        let kinds: Vec<_> = smf.tracks[0].iter().map(|e| (e.delta.as_int(), e.kind)).collect();
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], (0, TrackEventKind::Meta(MetaMessage::Tempo(t))) if t.as_int() == 120_000));
        assert!(matches!(
            kinds[1],
            (0, TrackEventKind::Midi { message: MidiMessage::NoteOn { key, vel }, .. })
                if key.as_int() == 60 && vel.as_int() == 80
        ));
        assert!(matches!(
            kinds[2],
            (120, TrackEventKind::Midi { message: MidiMessage::NoteOff { key, vel }, .. })
                if key.as_int() == 60 && vel.as_int() == 0
        ));
        assert!(matches!(kinds[3], (0, TrackEventKind::Meta(MetaMessage::EndOfTrack))));
    }

    #[test]
    fn second_save_same_day_reuses_folder() {
        let root = tempfile::tempdir().unwrap();
        let persister = FilePersister::new(root.path().to_path_buf(), "piano_");

        persister.save(&sample_track(), &start()).unwrap();
        let later = Local.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
        persister.save(&sample_track(), &later).unwrap();

        let entries = std::fs::read_dir(root.path().join("2024-03-09")).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn missing_root_is_not_created() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("not-mounted");
        let persister = FilePersister::new(missing.clone(), "piano_");

        let err = persister.save(&sample_track(), &start()).unwrap_err();
        assert!(matches!(err, StorageError::RootMissing(ref p) if *p == missing));
        assert!(!missing.exists());
    }
}
