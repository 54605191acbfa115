// ALSA sequencer backend (Linux)

use std::ffi::CString;
use std::time::Duration;

use alsa::seq::{
    Addr, ClientIter, EvNote, EventType, PortCap, PortInfo, PortIter, PortSubscribe, PortType, Seq,
};
use alsa::{Direction, PollDescriptors};

use super::{
    DevicePort, InputHandle, MidiError, QueueHandle, QueueTempo, RawEventKind, RawMidiEvent, Result,
    Sequencer,
};

/// The system client owns the timer and announce ports
const SND_SEQ_CLIENT_SYSTEM: i32 = 0;

impl From<alsa::Error> for MidiError {
    fn from(err: alsa::Error) -> Self {
        MidiError::Alsa(err.to_string())
    }
}

/// One ALSA sequencer client, open for the lifetime of the process
pub struct AlsaSequencer {
    seq: Seq,
    client_id: i32,
}

impl AlsaSequencer {
    /// Open the sequencer in non-blocking duplex mode and name the client
    pub fn open(client_name: &str) -> Result<Self> {
        let seq = Seq::open(None, None, true)
            .map_err(|e| MidiError::Init(format!("cannot open ALSA sequencer: {}", e)))?;
        let name = CString::new(client_name)?;
        seq.set_client_name(&name)?;
        let client_id = seq.client_id()?;

        log::info!("Opened ALSA sequencer client {} ({})", client_id, client_name);

        Ok(Self { seq, client_id })
    }

    fn parse_addr(port: &DevicePort) -> Result<Addr> {
        let (client, port_id) = port
            .id
            .split_once(':')
            .and_then(|(c, p)| Some((c.parse::<i32>().ok()?, p.parse::<i32>().ok()?)))
            .ok_or_else(|| MidiError::PortNotFound(port.id.clone()))?;
        Ok(Addr { client, port: port_id })
    }

    fn own_addr(&self, input: InputHandle) -> Addr {
        Addr {
            client: self.client_id,
            port: input.0,
        }
    }

    fn is_capture_source(&self, client: i32, info: &PortInfo) -> bool {
        client != SND_SEQ_CLIENT_SYSTEM
            && client != self.client_id
            && info.get_capability().contains(PortCap::READ | PortCap::SUBS_READ)
            && info.get_type().contains(PortType::MIDI_GENERIC | PortType::HARDWARE)
    }

    fn pending_events(&self) -> Result<u32> {
        let input = self.seq.input();
        Ok(input.event_input_pending(true)?)
    }
}

fn decode_event(ev: &alsa::seq::Event) -> RawMidiEvent {
    let tick = ev.get_tick().unwrap_or(0);
    let event_type = ev.get_type();
    let note = ev.get_data::<EvNote>();

    let kind = match (event_type, note) {
        (EventType::Noteon, Some(n)) => RawEventKind::NoteOn {
            channel: n.channel,
            note: n.note,
            velocity: n.velocity,
        },
        (EventType::Noteoff, Some(n)) => RawEventKind::NoteOff {
            channel: n.channel,
            note: n.note,
            velocity: n.velocity,
        },
        (EventType::Sensing, _) => RawEventKind::ActiveSensing,
        (other, _) => RawEventKind::Other(format!("{:?}", other)),
    };

    RawMidiEvent { tick, kind }
}

impl Sequencer for AlsaSequencer {
    fn input_ports(&self) -> Result<Vec<DevicePort>> {
        let mut ports = Vec::new();
        for client in ClientIter::new(&self.seq) {
            let client_id = client.get_client();
            let client_name = client.get_name().unwrap_or("").to_string();

            for info in PortIter::new(&self.seq, client_id) {
                if self.is_capture_source(client_id, &info) {
                    ports.push(DevicePort {
                        id: format!("{}:{}", client_id, info.get_port()),
                        client_name: client_name.clone(),
                        port_name: info.get_name().unwrap_or("").to_string(),
                    });
                }
            }
        }
        Ok(ports)
    }

    fn create_queue(&mut self, name: &str, tempo: QueueTempo) -> Result<QueueHandle> {
        let name = CString::new(name)?;
        let queue = self.seq.alloc_named_queue(&name)?;

        let queue_tempo = alsa::seq::QueueTempo::empty()?;
        queue_tempo.set_tempo(tempo.tempo_us);
        queue_tempo.set_ppq(tempo.ticks_per_beat as i32);
        if let Err(e) = self.seq.set_queue_tempo(queue, &queue_tempo) {
            let _ = self.seq.free_queue(queue);
            return Err(e.into());
        }

        Ok(QueueHandle(queue))
    }

    fn start_queue(&mut self, queue: QueueHandle) -> Result<()> {
        self.seq.control_queue(queue.0, EventType::Start, 0, None)?;
        self.seq.drain_output()?;
        Ok(())
    }

    fn create_input(&mut self, name: &str, queue: QueueHandle) -> Result<InputHandle> {
        let name = CString::new(name)?;
        let mut info = PortInfo::empty()?;
        info.set_name(&name);
        info.set_capability(PortCap::WRITE | PortCap::SUBS_WRITE);
        info.set_type(PortType::MIDI_GENERIC | PortType::APPLICATION);
        info.set_timestamping(true);
        info.set_timestamp_real(false);
        info.set_timestamp_queue(queue.0);
        self.seq.create_port(&info)?;

        Ok(InputHandle(info.get_port()))
    }

    fn connect_from(&mut self, input: InputHandle, port: &DevicePort) -> Result<()> {
        let subscribe = PortSubscribe::empty()?;
        subscribe.set_sender(Self::parse_addr(port)?);
        subscribe.set_dest(self.own_addr(input));
        self.seq.subscribe_port(&subscribe)?;
        Ok(())
    }

    fn disconnect_from(&mut self, input: InputHandle, port: &DevicePort) -> Result<()> {
        self.seq
            .unsubscribe_port(Self::parse_addr(port)?, self.own_addr(input))?;
        Ok(())
    }

    fn read_event(&mut self, timeout: Duration) -> Result<Option<RawMidiEvent>> {
        if self.pending_events()? == 0 {
            let mut fds = (&self.seq, Some(Direction::Capture)).get()?;
            let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
            alsa::poll::poll(&mut fds, timeout_ms)?;
            if self.pending_events()? == 0 {
                return Ok(None);
            }
        }

        let mut input = self.seq.input();
        let event = input.event_input()?;
        Ok(Some(decode_event(&event)))
    }

    fn drain_output(&mut self) -> Result<()> {
        self.seq.drain_output()?;
        Ok(())
    }

    fn stop_queue(&mut self, queue: QueueHandle) -> Result<()> {
        self.seq.control_queue(queue.0, EventType::Stop, 0, None)?;
        Ok(())
    }

    fn close_queue(&mut self, queue: QueueHandle) -> Result<()> {
        self.seq.free_queue(queue.0)?;
        Ok(())
    }

    fn delete_input(&mut self, input: InputHandle) -> Result<()> {
        self.seq.delete_port(input.0)?;
        Ok(())
    }
}
