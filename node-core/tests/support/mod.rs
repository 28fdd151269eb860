#![allow(dead_code)]

//! Simulated peripherals shared by the integration tests.
//!
//! Every mock shares one [`SimTime`] so delays, the microsecond clock, and the
//! simulated echo line agree on "now".

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use node_core::SampleStatus;
use node_core::sensor::{DistanceSensor, MicrosClock, RawSample};

/// Simulated time in microseconds.
#[derive(Clone, Default)]
pub struct SimTime(Rc<Cell<u64>>);

impl SimTime {
    pub fn now(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, us: u64) {
        self.0.set(self.0.get() + us);
    }
}

/// Delay that only advances simulated time.
#[derive(Clone)]
pub struct SimDelay {
    time: SimTime,
    total_us: Rc<Cell<u64>>,
}

impl SimDelay {
    pub fn new(time: &SimTime) -> Self {
        Self {
            time: time.clone(),
            total_us: Rc::default(),
        }
    }

    pub fn total_us(&self) -> u64 {
        self.total_us.get()
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        let us = u64::from(ns).div_ceil(1_000);
        self.time.advance(us);
        self.total_us.set(self.total_us.get() + us);
    }
}

/// Clock that advances by one microsecond per read, like a busy-polled timer.
pub struct SimClock(pub SimTime);

impl MicrosClock for SimClock {
    fn now_micros(&mut self) -> u64 {
        self.0.advance(1);
        self.0.now()
    }
}

/// Echo pulse width that decodes to exactly `cm`.
pub fn echo_width_for(cm: u64) -> u64 {
    (cm * 1_000 + 16) / 17 + 10
}

#[derive(Default)]
struct EchoState {
    trigger_high: bool,
    trigger_high_since: u64,
    pulses: u32,
    /// Start and width of the pending echo, relative to simulated time.
    echo: Option<(u64, u64)>,
}

/// Trigger/echo ranging module answering every valid trigger pulse.
#[derive(Clone)]
pub struct EchoModule {
    time: SimTime,
    state: Rc<RefCell<EchoState>>,
    lead_us: u64,
    width_us: Rc<Cell<Option<u64>>>,
}

impl EchoModule {
    pub fn new(time: &SimTime) -> Self {
        Self {
            time: time.clone(),
            state: Rc::default(),
            lead_us: 450,
            width_us: Rc::new(Cell::new(None)),
        }
    }

    /// Subsequent echoes decode to `cm`.
    pub fn set_distance(&self, cm: u64) {
        self.width_us.set(Some(echo_width_for(cm)));
    }

    pub fn set_width(&self, width_us: Option<u64>) {
        self.width_us.set(width_us);
    }

    /// Complete trigger pulses (at least 10 µs high) observed so far.
    pub fn pulses(&self) -> u32 {
        self.state.borrow().pulses
    }

    pub fn trigger(&self) -> TriggerPin {
        TriggerPin(self.clone())
    }

    pub fn echo(&self) -> EchoPin {
        EchoPin(self.clone())
    }
}

pub struct TriggerPin(EchoModule);

impl digital::ErrorType for TriggerPin {
    type Error = Infallible;
}

impl OutputPin for TriggerPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let module = &self.0;
        let now = module.time.now();
        let mut state = module.state.borrow_mut();
        if state.trigger_high && now - state.trigger_high_since >= 10 {
            state.pulses += 1;
            state.echo = module
                .width_us
                .get()
                .map(|width| (now + module.lead_us, width));
        }
        state.trigger_high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut state = self.0.state.borrow_mut();
        state.trigger_high = true;
        state.trigger_high_since = self.0.time.now();
        Ok(())
    }
}

pub struct EchoPin(EchoModule);

impl digital::ErrorType for EchoPin {
    type Error = Infallible;
}

impl InputPin for EchoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let now = self.0.time.now();
        Ok(self
            .0
            .state
            .borrow()
            .echo
            .is_some_and(|(start, width)| now >= start && now < start + width))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Reply of the framed module to one query byte.
#[derive(Clone, Debug)]
pub enum Reply {
    Silent,
    Bytes(Vec<u8>),
}

struct SerialState {
    rx: VecDeque<u8>,
    script: VecDeque<Reply>,
    query_byte: u8,
    queries: u32,
    written: Vec<u8>,
    refuse_writes: bool,
    unplugged: bool,
}

impl Default for SerialState {
    fn default() -> Self {
        Self {
            rx: VecDeque::new(),
            script: VecDeque::new(),
            query_byte: 0x01,
            queries: 0,
            written: Vec::new(),
            refuse_writes: false,
            unplugged: false,
        }
    }
}

/// Framed serial ranging module driven by a reply script.
#[derive(Clone, Default)]
pub struct SerialModule(Rc<RefCell<SerialState>>);

impl SerialModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.0.borrow_mut().script.push_back(reply);
        self
    }

    /// Queues a well-formed frame for `millimeters`.
    pub fn reply_millimeters(&self, millimeters: u16) -> &Self {
        let [high, low] = millimeters.to_be_bytes();
        let checksum = 0xFFu8.wrapping_add(high).wrapping_add(low);
        self.reply(Reply::Bytes(vec![0xFF, high, low, checksum]))
    }

    /// Bytes already waiting in the receive buffer before any query.
    pub fn preload(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Answers `byte` instead of the usual `0x01` query.
    pub fn answer_to(&self, byte: u8) {
        self.0.borrow_mut().query_byte = byte;
    }

    /// Every write fails from now on; reads keep working.
    pub fn refuse_writes(&self) {
        self.0.borrow_mut().refuse_writes = true;
    }

    /// Every read, write and readiness check fails from now on.
    pub fn unplug(&self) {
        self.0.borrow_mut().unplugged = true;
    }

    pub fn queries(&self) -> u32 {
        self.0.borrow().queries
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn pending_rx(&self) -> usize {
        self.0.borrow().rx.len()
    }

    fn check_link(&self) -> Result<(), ErrorKind> {
        if self.0.borrow().unplugged {
            Err(ErrorKind::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl ErrorType for SerialModule {
    type Error = ErrorKind;
}

impl Write for SerialModule {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.check_link()?;
        let mut state = self.0.borrow_mut();
        if state.refuse_writes {
            return Err(ErrorKind::BrokenPipe);
        }
        for &byte in buf {
            state.written.push(byte);
            if byte == state.query_byte {
                state.queries += 1;
                if let Some(Reply::Bytes(bytes)) = state.script.pop_front() {
                    state.rx.extend(bytes);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.check_link()
    }
}

impl Read for SerialModule {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.check_link()?;
        let mut state = self.0.borrow_mut();
        let mut count = 0;
        for slot in buf.iter_mut() {
            match state.rx.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl ReadReady for SerialModule {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.check_link()?;
        Ok(!self.0.borrow().rx.is_empty())
    }
}

/// Outbound radio capturing everything written to it.
#[derive(Clone, Default)]
pub struct Radio(Rc<RefCell<Vec<u8>>>);

impl Radio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("radio output is ASCII")
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_owned).collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl ErrorType for Radio {
    type Error = Infallible;
}

impl Write for Radio {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Radio whose every write fails.
pub struct DeadRadio;

impl ErrorType for DeadRadio {
    type Error = ErrorKind;
}

impl Write for DeadRadio {
    fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
        Err(ErrorKind::BrokenPipe)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::BrokenPipe)
    }
}

/// Power output recording the level transitions it accepted.
#[derive(Clone, Default)]
pub struct Rail {
    levels: Rc<RefCell<Vec<bool>>>,
    refuse_high: Rc<Cell<bool>>,
    refuse_low: Rc<Cell<bool>>,
}

impl Rail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rail whose driver never manages to switch it on.
    pub fn stuck_low() -> Self {
        let rail = Self::default();
        rail.refuse_high.set(true);
        rail
    }

    /// Rail whose driver never manages to switch it off.
    pub fn stuck_high() -> Self {
        let rail = Self::default();
        rail.refuse_low.set(true);
        rail
    }

    pub fn is_high(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    pub fn transitions(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }
}

impl digital::ErrorType for Rail {
    type Error = digital::ErrorKind;
}

impl OutputPin for Rail {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.refuse_low.get() {
            return Err(digital::ErrorKind::Other);
        }
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.refuse_high.get() {
            return Err(digital::ErrorKind::Other);
        }
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

/// GPIO whose every access fails, like a pin behind a faulted expander.
pub struct BrokenPin;

impl digital::ErrorType for BrokenPin {
    type Error = digital::ErrorKind;
}

impl OutputPin for BrokenPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(digital::ErrorKind::Other)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(digital::ErrorKind::Other)
    }
}

impl InputPin for BrokenPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Err(digital::ErrorKind::Other)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Err(digital::ErrorKind::Other)
    }
}

/// Sensor replaying fixed raw readings, then reporting the sentinel forever.
pub struct ScriptedSensor {
    readings: VecDeque<u32>,
    tank_height: u16,
}

impl ScriptedSensor {
    pub fn new(readings: &[u32], tank_height: u16) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            tank_height,
        }
    }

    /// Appends a reading behind the scripted ones.
    pub fn push(&mut self, reading: u32) {
        self.readings.push_back(reading);
    }

    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl DistanceSensor for ScriptedSensor {
    fn acquire_distance(&mut self) -> RawSample {
        match self.readings.pop_front() {
            Some(reading) => RawSample::from_reading(reading, self.tank_height),
            None => RawSample::rejected(SampleStatus::Timeout, self.tank_height),
        }
    }
}
