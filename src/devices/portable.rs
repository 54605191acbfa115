// Portable backend on top of midir

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use midir::{Ignore, MidiInput, MidiInputConnection};

use super::{
    decode_message, DevicePort, InputHandle, MidiError, QueueHandle, QueueTempo, RawMidiEvent, Result,
    Sequencer,
};

/// Message handed from the midir callback thread to the recorder
struct Incoming {
    received_at: Instant,
    data: Vec<u8>,
}

/// Software queue: ticks are derived from wall time since the queue started
struct SoftQueue {
    tempo: QueueTempo,
    started_at: Option<Instant>,
}

/// Sequencer emulation for platforms without ALSA.
///
/// midir cannot filter by port type, so every input port is offered.
pub struct MidirSequencer {
    client_name: String,
    queue: Option<SoftQueue>,
    connection: Option<MidiInputConnection<()>>,
    tx: Sender<Incoming>,
    rx: Receiver<Incoming>,
}

impl MidirSequencer {
    pub fn open(client_name: &str) -> Result<Self> {
        // Probe once so a missing MIDI subsystem fails at startup
        MidiInput::new(client_name).map_err(|e| MidiError::Init(e.to_string()))?;
        let (tx, rx) = crossbeam_channel::unbounded();

        log::info!("Opened midir client ({})", client_name);

        Ok(Self {
            client_name: client_name.to_string(),
            queue: None,
            connection: None,
            tx,
            rx,
        })
    }

    fn new_input(&self) -> Result<MidiInput> {
        let mut midi_in = MidiInput::new(&self.client_name).map_err(|e| MidiError::Init(e.to_string()))?;
        midi_in.ignore(Ignore::None);
        Ok(midi_in)
    }

    fn tick_at(&self, at: Instant) -> u32 {
        match &self.queue {
            Some(SoftQueue { tempo, started_at: Some(start) }) => {
                tempo.ticks_for(at.saturating_duration_since(*start))
            }
            _ => 0,
        }
    }
}

impl Sequencer for MidirSequencer {
    fn input_ports(&self) -> Result<Vec<DevicePort>> {
        let midi_in = self.new_input()?;
        let mut ports = Vec::new();
        for (index, port) in midi_in.ports().iter().enumerate() {
            if let Ok(name) = midi_in.port_name(port) {
                ports.push(DevicePort {
                    id: format!("midi-{}", index),
                    client_name: self.client_name.clone(),
                    port_name: name,
                });
            }
        }
        Ok(ports)
    }

    fn create_queue(&mut self, _name: &str, tempo: QueueTempo) -> Result<QueueHandle> {
        self.queue = Some(SoftQueue { tempo, started_at: None });
        Ok(QueueHandle(0))
    }

    fn start_queue(&mut self, _queue: QueueHandle) -> Result<()> {
        let queue = self.queue.as_mut().ok_or(MidiError::NoQueue)?;
        queue.started_at = Some(Instant::now());
        Ok(())
    }

    fn create_input(&mut self, _name: &str, _queue: QueueHandle) -> Result<InputHandle> {
        if self.queue.is_none() {
            return Err(MidiError::NoQueue);
        }
        // Stale events from a previous session must not leak into this one
        while self.rx.try_recv().is_ok() {}
        Ok(InputHandle(0))
    }

    fn connect_from(&mut self, _input: InputHandle, port: &DevicePort) -> Result<()> {
        let midi_in = self.new_input()?;
        let target = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map(|n| n == port.port_name).unwrap_or(false))
            .ok_or_else(|| MidiError::PortNotFound(port.port_name.clone()))?;

        let tx = self.tx.clone();
        let connection = midi_in
            .connect(
                &target,
                "input",
                move |_timestamp_us, message, _| {
                    let _ = tx.send(Incoming {
                        received_at: Instant::now(),
                        data: message.to_vec(),
                    });
                },
                (),
            )
            .map_err(|e| MidiError::Backend(format!("connect {}: {}", port.port_name, e)))?;

        self.connection = Some(connection);
        Ok(())
    }

    fn disconnect_from(&mut self, _input: InputHandle, port: &DevicePort) -> Result<()> {
        match self.connection.take() {
            Some(connection) => {
                connection.close();
                Ok(())
            }
            None => Err(MidiError::PortNotFound(port.port_name.clone())),
        }
    }

    fn read_event(&mut self, timeout: Duration) -> Result<Option<RawMidiEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(incoming) => Ok(Some(RawMidiEvent {
                tick: self.tick_at(incoming.received_at),
                kind: decode_message(&incoming.data),
            })),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(MidiError::Backend("event channel disconnected".into()))
            }
        }
    }

    fn drain_output(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_queue(&mut self, _queue: QueueHandle) -> Result<()> {
        let queue = self.queue.as_mut().ok_or(MidiError::NoQueue)?;
        queue.started_at = None;
        Ok(())
    }

    fn close_queue(&mut self, _queue: QueueHandle) -> Result<()> {
        self.queue.take().map(|_| ()).ok_or(MidiError::NoQueue)
    }

    fn delete_input(&mut self, _input: InputHandle) -> Result<()> {
        self.connection = None;
        Ok(())
    }
}
