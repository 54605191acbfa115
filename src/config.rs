// Configuration management for Midicatcher

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::devices::QueueTempo;

/// Slowest tempo whose microseconds per beat still fit in 24 bits
const MIN_TEMPO_BPM: u32 = 4;
/// Fastest tempo that still leaves at least one microsecond per beat
const MAX_TEMPO_BPM: u32 = 60_000_000;
/// Largest metrical resolution a file header can carry
const MAX_TICKS_PER_BEAT: u16 = 0x7FFF;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root under which dated recording folders are created.
    /// Treated as a mount point: it must exist, it is never created.
    pub recording_path: PathBuf,

    /// File that receives the process id for external supervision.
    /// Its parent directory doubles as the startup readiness gate.
    pub pid_file: PathBuf,

    /// Silence in seconds after the last note before a performance is saved
    pub idle_timeout_secs: u64,

    /// Upper bound on a single event read, in milliseconds
    pub read_timeout_ms: u64,

    /// Wait between port scans while no device is connected
    pub device_check_interval_secs: u64,

    /// Minimum interval between PID file writes
    pub pid_write_interval_secs: u64,

    /// Poll interval while waiting for the PID directory to appear
    pub mount_poll_interval_secs: u64,

    /// Queue tempo in beats per minute
    pub tempo_bpm: u32,

    /// Queue and file resolution
    pub ticks_per_beat: u16,

    /// Name registered with the OS MIDI subsystem
    pub client_name: String,

    /// Prefix of every recorded file name
    pub file_prefix: String,

    /// Which OS MIDI backend to use
    pub backend: Backend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// ALSA sequencer with queue tick timestamps (Linux only)
    Alsa,
    /// midir, ticks derived from arrival time
    Midir,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Alsa
        } else {
            Self::Midir
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recording_path: PathBuf::from("/mnt/nas_drop/midicatcher"),
            pid_file: get_default_pid_file(),
            idle_timeout_secs: 5,
            read_timeout_ms: 1000,
            device_check_interval_secs: 5,
            pid_write_interval_secs: 5,
            mount_poll_interval_secs: 1,
            tempo_bpm: 500,
            ticks_per_beat: 480,
            client_name: "midicatcher".to_string(),
            file_prefix: "piano_".to_string(),
            backend: Backend::default(),
        }
    }
}

impl Config {
    /// Load config from disk or return default
    pub fn load_or_default(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(config) => return config.validated(),
                    Err(e) => {
                        log::warn!("Failed to parse config {}: {}", config_path.display(), e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config file {}: {}", config_path.display(), e);
                }
            }
        }

        Self::default()
    }

    /// Replace values the queue or the file header cannot represent with
    /// their defaults, logging each one.
    ///
    /// The tempo meta event holds 24 bits of microseconds per beat and the
    /// header 15 bits of ticks per beat.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&self.tempo_bpm) {
            log::warn!(
                "tempo_bpm = {} is outside {}..={}, using {}",
                self.tempo_bpm,
                MIN_TEMPO_BPM,
                MAX_TEMPO_BPM,
                defaults.tempo_bpm
            );
            self.tempo_bpm = defaults.tempo_bpm;
        }

        if !(1..=MAX_TICKS_PER_BEAT).contains(&self.ticks_per_beat) {
            log::warn!(
                "ticks_per_beat = {} is outside 1..={}, using {}",
                self.ticks_per_beat,
                MAX_TICKS_PER_BEAT,
                defaults.ticks_per_beat
            );
            self.ticks_per_beat = defaults.ticks_per_beat;
        }

        self
    }

    /// Save config to disk
    pub fn save(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(config_path, self.to_toml()?)?;

        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn device_check_interval(&self) -> Duration {
        Duration::from_secs(self.device_check_interval_secs)
    }

    pub fn pid_write_interval(&self) -> Duration {
        Duration::from_secs(self.pid_write_interval_secs)
    }

    pub fn mount_poll_interval(&self) -> Duration {
        Duration::from_secs(self.mount_poll_interval_secs)
    }

    pub fn queue_tempo(&self) -> QueueTempo {
        QueueTempo::from_bpm(self.tempo_bpm, self.ticks_per_beat)
    }
}

/// Get the default PID file path
fn get_default_pid_file() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/run/user/1000"))
        .join("midicatcher.pid")
}

/// Get the default config file path
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midicatcher")
        .join("config.toml")
}
