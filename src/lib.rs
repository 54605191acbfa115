// Midicatcher - unattended MIDI performance capture
// Main library entry point

pub mod clock;
pub mod config;
pub mod devices;
pub mod liveness;
pub mod recording;
pub mod session;

#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

use anyhow::Context;

use clock::{Clock, SystemClock};
use config::{Backend, Config};
use devices::{DeviceWatcher, Sequencer};
use recording::Recorder;

/// Open the configured MIDI backend and record forever.
///
/// Only returns on a startup failure.
pub fn run(config: Config) -> anyhow::Result<()> {
    let clock = SystemClock;
    log::info!("Midicatcher starting @ {}", clock.now().to_rfc3339());

    if let Some(pid_dir) = config.pid_file.parent() {
        liveness::wait_for_directory(pid_dir, config.mount_poll_interval(), &clock);
    }
    log::info!("Starting to listen...");

    match config.backend {
        Backend::Alsa => {
            #[cfg(target_os = "linux")]
            {
                let seq = devices::alsa_seq::AlsaSequencer::open(&config.client_name)
                    .context("Failed to open the ALSA sequencer")?;
                record_forever(seq, &config, clock)
            }
            #[cfg(not(target_os = "linux"))]
            {
                anyhow::bail!("The ALSA backend is only available on Linux, use backend = \"midir\"")
            }
        }
        Backend::Midir => {
            let seq = devices::portable::MidirSequencer::open(&config.client_name)
                .context("Failed to open a midir client")?;
            record_forever(seq, &config, clock)
        }
    }
}

fn record_forever<S: Sequencer, C: Clock>(mut seq: S, config: &Config, clock: C) -> ! {
    let mut recorder = Recorder::new(config, clock);
    DeviceWatcher::from_config(config).run(&mut seq, &mut recorder)
}

/// Print the ports the configured backend would record from
pub fn list_ports(config: &Config) -> anyhow::Result<()> {
    let ports = match config.backend {
        Backend::Alsa => {
            #[cfg(target_os = "linux")]
            {
                devices::alsa_seq::AlsaSequencer::open(&config.client_name)?.input_ports()?
            }
            #[cfg(not(target_os = "linux"))]
            {
                anyhow::bail!("The ALSA backend is only available on Linux")
            }
        }
        Backend::Midir => devices::portable::MidirSequencer::open(&config.client_name)?.input_ports()?,
    };

    if ports.is_empty() {
        println!("No MIDI input ports found");
    }
    for (i, port) in ports.iter().enumerate() {
        println!("{}. {}", i + 1, port);
    }
    Ok(())
}
