use std::path::Path;
use std::time::{Duration, Instant};

use super::validators::{recorded_files, validate_midi, SavedNote};
use super::{note_on, port, recorder_in, FakeSequencer, ManualClock, Step};
use crate::clock::Clock;
use crate::devices::{DeviceWatcher, RawEventKind, RawMidiEvent, WatchOutcome};

// ── Test case types ──────────────────────────────────────────────────

/// A scripted end-to-end scenario run against a fresh recording root
pub struct Scenario {
    pub name: &'static str,
    pub run: fn(&Path) -> Result<(), String>,
}

/// Result of a single scenario run.
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario { name: "plug_in_and_play", run: plug_in_and_play },
        Scenario { name: "silence_is_not_recorded", run: silence_is_not_recorded },
        Scenario { name: "replug_starts_new_session", run: replug_starts_new_session },
        Scenario { name: "crash_keeps_partial_take", run: crash_keeps_partial_take },
    ]
}

// ── Test execution ───────────────────────────────────────────────────

pub fn run_scenario(scenario: &Scenario, keep_sessions: bool) -> TestResult {
    let start = Instant::now();

    let outcome = tempfile::tempdir()
        .map_err(|e| format!("Failed to create temp dir: {}", e))
        .and_then(|dir| {
            let result = (scenario.run)(dir.path());
            if keep_sessions {
                let kept = dir.keep();
                println!("  kept sessions in {}", kept.display());
            }
            result
        });

    TestResult {
        name: scenario.name.to_string(),
        passed: outcome.is_ok(),
        duration_ms: start.elapsed().as_millis() as u64,
        errors: outcome.err().into_iter().collect(),
    }
}

fn expect(condition: bool, message: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

/// No keyboard, then a keyboard, one short phrase, five seconds of silence
fn plug_in_and_play(root: &Path) -> Result<(), String> {
    let clock = ManualClock::starting_at(2024, 6, 14, 19, 30, 0);
    let mut recorder = recorder_in(root, clock.clone());
    let mut seq = FakeSequencer::new(clock.clone());
    let watcher = DeviceWatcher::new(Duration::from_secs(5));

    seq.push_scan(vec![]);
    seq.push_scan(vec![port("24:0")]);
    seq.push_session(vec![
        Step::Silence(Duration::from_secs(3)),
        Step::Event(note_on(60, 80, 0)),
        Step::Silence(Duration::from_millis(250)),
        Step::Event(note_on(60, 0, 120)),
    ]);

    let first = watcher.cycle(&mut seq, &mut recorder);
    expect(matches!(first, Some(WatchOutcome::NoDevice)), "first scan should find no device")?;

    let summary = match watcher.cycle(&mut seq, &mut recorder) {
        Some(WatchOutcome::Recorded(summary)) => summary,
        other => return Err(format!("expected a recorded session, got {:?}", other)),
    };

    // 5s device wait + 3s before the first note
    let started = clock.initial() + chrono::Duration::seconds(8);
    expect(summary.started_at == Some(started), format!("start time {:?}", summary.started_at))?;

    let expected_path = root
        .join(started.format("%Y-%m-%d").to_string())
        .join(format!("piano_{}.mid", started.format("%Y-%m-%d_%H:%M:%S")));
    expect(
        summary.saved_to.as_deref() == Some(expected_path.as_path()),
        format!("saved to {:?}, expected {}", summary.saved_to, expected_path.display()),
    )?;

    let midi = validate_midi(&expected_path)?;
    expect(midi.ticks_per_beat == 480, format!("ticks per beat {}", midi.ticks_per_beat))?;
    expect(midi.tempo_us == 120_000, format!("tempo {}", midi.tempo_us))?;
    expect(
        midi.notes
            == vec![
                SavedNote::On { key: 60, vel: 80, delta: 0 },
                SavedNote::Off { key: 60, vel: 0, delta: 120 },
            ],
        format!("notes {:?}", midi.notes),
    )?;

    let pid = std::fs::read_to_string(root.join("midicatcher.pid")).map_err(|e| e.to_string())?;
    expect(pid == std::process::id().to_string(), format!("pid file contains {:?}", pid))
}

/// Heartbeats and a long pause, then the device disappears: nothing is saved
fn silence_is_not_recorded(root: &Path) -> Result<(), String> {
    let clock = ManualClock::starting_at(2024, 6, 14, 22, 0, 0);
    let mut recorder = recorder_in(root, clock.clone());
    let mut seq = FakeSequencer::new(clock);
    let watcher = DeviceWatcher::new(Duration::from_secs(5));
    let sensing = RawMidiEvent { tick: 0, kind: RawEventKind::ActiveSensing };

    seq.push_scan(vec![port("24:0")]);
    seq.push_session(vec![
        Step::Event(sensing.clone()),
        Step::Silence(Duration::from_secs(60)),
        Step::Event(sensing),
        Step::Fail("device removed".into()),
    ]);

    expect(watcher.cycle(&mut seq, &mut recorder).is_none(), "session should end in an error")?;
    expect(seq.is_idle(), "queue or endpoint left open")?;
    let files = recorded_files(root);
    expect(files.is_empty(), format!("unexpected recordings {:?}", files))
}

/// Two phrases with an unplug in between produce two files, no restart
fn replug_starts_new_session(root: &Path) -> Result<(), String> {
    let clock = ManualClock::starting_at(2024, 6, 14, 20, 0, 0);
    let mut recorder = recorder_in(root, clock.clone());
    let mut seq = FakeSequencer::new(clock);
    let watcher = DeviceWatcher::new(Duration::from_secs(5));

    seq.push_scan(vec![port("24:0")]);
    seq.push_session(vec![Step::Event(note_on(60, 80, 0)), Step::Event(note_on(60, 0, 480))]);
    seq.push_scan(vec![]);
    seq.push_scan(vec![port("28:0")]);
    seq.push_session(vec![Step::Event(note_on(67, 90, 10)), Step::Event(note_on(67, 0, 250))]);

    let outcomes: Vec<_> = (0..3).map(|_| watcher.cycle(&mut seq, &mut recorder)).collect();
    expect(
        matches!(
            outcomes.as_slice(),
            [Some(WatchOutcome::Recorded(_)), Some(WatchOutcome::NoDevice), Some(WatchOutcome::Recorded(_))]
        ),
        format!("unexpected cycle outcomes {:?}", outcomes),
    )?;
    expect(
        seq.connected_ports() == vec!["24:0".to_string(), "28:0".to_string()],
        format!("connected to {:?}", seq.connected_ports()),
    )?;

    let files = recorded_files(root);
    expect(files.len() == 2, format!("expected 2 recordings, found {:?}", files))?;
    let second = validate_midi(&files[1])?;
    expect(
        second.notes
            == vec![
                SavedNote::On { key: 67, vel: 90, delta: 0 },
                SavedNote::Off { key: 67, vel: 0, delta: 240 },
            ],
        format!("second recording notes {:?}", second.notes),
    )
}

/// A read error mid-phrase keeps what was played so far
fn crash_keeps_partial_take(root: &Path) -> Result<(), String> {
    let clock = ManualClock::starting_at(2024, 6, 14, 23, 59, 58);
    let mut recorder = recorder_in(root, clock.clone());
    let mut seq = FakeSequencer::new(clock.clone());
    let watcher = DeviceWatcher::new(Duration::from_secs(5));

    seq.push_scan(vec![port("24:0")]);
    seq.push_session(vec![
        Step::Event(note_on(48, 60, 100)),
        Step::Silence(Duration::from_secs(3)),
        Step::Event(note_on(52, 60, 2000)),
        Step::Fail("read error".into()),
    ]);

    expect(watcher.cycle(&mut seq, &mut recorder).is_none(), "session should fail")?;
    expect(
        clock.now() > clock.initial() + chrono::Duration::seconds(5),
        "watcher did not back off after the failure",
    )?;

    let files = recorded_files(root);
    expect(files.len() == 1, format!("expected the partial take, found {:?}", files))?;
    // filed under the day the phrase started, not the day it failed
    expect(files[0].to_string_lossy().contains("2024-06-14"), format!("{}", files[0].display()))?;
    let midi = validate_midi(&files[0])?;
    expect(midi.total_ticks == 1900, format!("total ticks {}", midi.total_ticks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_scenarios_pass() {
        for scenario in scenarios() {
            let result = run_scenario(&scenario, false);
            assert!(result.passed, "{}: {:?}", result.name, result.errors);
        }
    }
}
