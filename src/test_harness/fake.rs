use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use super::clock::ManualClock;
use crate::devices::{
    DevicePort, InputHandle, MidiError, QueueHandle, QueueTempo, RawMidiEvent, Result, Sequencer,
};

/// One scripted step of a session's event stream
#[derive(Debug, Clone)]
pub enum Step {
    /// Delivered on the next read, without advancing the clock
    Event(RawMidiEvent),
    /// Nothing arrives for this long; reads time out meanwhile
    Silence(Duration),
    /// The next read fails, as when the device disappears mid-session
    Fail(String),
    /// Wall time jumps by this much while the read waits; nothing arrives
    WallClockStep(chrono::Duration),
}

/// Scripted stand-in for an OS sequencer.
///
/// Each `input_ports` call consumes one scripted scan (empty once they run
/// out). Each `create_queue` consumes one scripted session; reads past the
/// end of a script time out. Every call is logged by name.
pub struct FakeSequencer {
    clock: ManualClock,
    scans: Mutex<VecDeque<Vec<DevicePort>>>,
    sessions: VecDeque<Vec<Step>>,
    current: VecDeque<Step>,
    failing: HashSet<String>,
    operations: Mutex<Vec<String>>,
    next_handle: i32,
    queue: Option<QueueHandle>,
    queue_tempo: Option<QueueTempo>,
    input: Option<InputHandle>,
    connected: Option<String>,
    connect_history: Vec<String>,
}

impl FakeSequencer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            scans: Mutex::new(VecDeque::new()),
            sessions: VecDeque::new(),
            current: VecDeque::new(),
            failing: HashSet::new(),
            operations: Mutex::new(Vec::new()),
            next_handle: 1,
            queue: None,
            queue_tempo: None,
            input: None,
            connected: None,
            connect_history: Vec::new(),
        }
    }

    pub fn push_scan(&mut self, ports: Vec<DevicePort>) {
        self.scans.get_mut().push_back(ports);
    }

    pub fn push_session(&mut self, steps: Vec<Step>) {
        self.sessions.push_back(steps);
    }

    /// Make every call to `operation` fail
    pub fn fail_on(&mut self, operation: &str) {
        self.failing.insert(operation.to_string());
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    /// Ports ever subscribed to, in order
    pub fn connected_ports(&self) -> Vec<String> {
        self.connect_history.clone()
    }

    pub fn last_queue_tempo(&self) -> Option<QueueTempo> {
        self.queue_tempo
    }

    /// No queue, input endpoint or subscription left open
    pub fn is_idle(&self) -> bool {
        self.queue.is_none() && self.input.is_none() && self.connected.is_none()
    }

    fn op(&self, name: &str) -> Result<()> {
        self.operations.lock().push(name.to_string());
        if self.failing.contains(name) {
            return Err(MidiError::Backend(format!("{} failed", name)));
        }
        Ok(())
    }

    fn handle(&mut self) -> i32 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl Sequencer for FakeSequencer {
    fn input_ports(&self) -> Result<Vec<DevicePort>> {
        self.op("input_ports")?;
        Ok(self.scans.lock().pop_front().unwrap_or_default())
    }

    fn create_queue(&mut self, _name: &str, tempo: QueueTempo) -> Result<QueueHandle> {
        self.op("create_queue")?;
        let queue = QueueHandle(self.handle());
        self.queue = Some(queue);
        self.queue_tempo = Some(tempo);
        self.current = self.sessions.pop_front().unwrap_or_default().into();
        Ok(queue)
    }

    fn start_queue(&mut self, queue: QueueHandle) -> Result<()> {
        self.op("start_queue")?;
        if self.queue != Some(queue) {
            return Err(MidiError::NoQueue);
        }
        Ok(())
    }

    fn create_input(&mut self, _name: &str, _queue: QueueHandle) -> Result<InputHandle> {
        self.op("create_input")?;
        let input = InputHandle(self.handle());
        self.input = Some(input);
        Ok(input)
    }

    fn connect_from(&mut self, _input: InputHandle, port: &DevicePort) -> Result<()> {
        self.op("connect_from")?;
        self.connected = Some(port.id.clone());
        self.connect_history.push(port.id.clone());
        Ok(())
    }

    fn disconnect_from(&mut self, _input: InputHandle, _port: &DevicePort) -> Result<()> {
        self.op("disconnect_from")?;
        self.connected = None;
        Ok(())
    }

    fn read_event(&mut self, timeout: Duration) -> Result<Option<RawMidiEvent>> {
        self.op("read_event")?;
        match self.current.pop_front() {
            Some(Step::Event(event)) => Ok(Some(event)),
            Some(Step::Silence(remaining)) => {
                let waited = remaining.min(timeout);
                self.clock.advance(waited);
                if remaining > waited {
                    self.current.push_front(Step::Silence(remaining - waited));
                }
                Ok(None)
            }
            Some(Step::Fail(reason)) => Err(MidiError::Backend(reason)),
            Some(Step::WallClockStep(delta)) => {
                self.clock.step_wall_clock(delta);
                Ok(None)
            }
            None => {
                self.clock.advance(timeout);
                Ok(None)
            }
        }
    }

    fn drain_output(&mut self) -> Result<()> {
        self.op("drain_output")
    }

    fn stop_queue(&mut self, _queue: QueueHandle) -> Result<()> {
        self.op("stop_queue")
    }

    fn close_queue(&mut self, _queue: QueueHandle) -> Result<()> {
        self.op("close_queue")?;
        self.queue = None;
        Ok(())
    }

    fn delete_input(&mut self, _input: InputHandle) -> Result<()> {
        self.op("delete_input")?;
        // a failed unsubscribe dies with the endpoint
        self.input = None;
        self.connected = None;
        Ok(())
    }
}
