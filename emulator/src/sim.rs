//! Simulated tank, ranging modules, radio and power rails.
//!
//! Peripherals share a [`SimClock`] in microseconds: blocking delays advance
//! it, and the pulse module derives its echo line from it. Simulated time is
//! independent of wall time, so a ten-frame burst costs nothing on the host.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_io::{ErrorType, Read, ReadReady, Write};
use node_core::sensor::{MicrosClock, SensorFrame};

/// Microseconds since the session started, in simulated time.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn now_us(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, us: u64) {
        self.0.set(self.0.get().saturating_add(us));
    }
}

impl MicrosClock for SimClock {
    fn now_micros(&mut self) -> u64 {
        self.advance(1);
        self.now_us()
    }
}

/// Blocking delay over simulated time.
#[derive(Clone)]
pub struct SimDelay(pub SimClock);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance(u64::from(ns).div_ceil(1_000));
    }
}

/// What the next ranging attempt observes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Observation {
    Distance(u32),
    Fault,
}

/// Liquid surface at a fixed distance below the sensor, with bounded noise.
pub struct Tank {
    level_cm: u32,
    noise_cm: u32,
    fault_every: Option<u32>,
    readings: u32,
    state: u64,
}

impl Tank {
    pub fn new(level_cm: u32, noise_cm: u32, fault_every: Option<u32>) -> Self {
        Self {
            level_cm,
            noise_cm,
            fault_every,
            readings: 0,
            state: 0x9E37_79B9_7F4A_7C15,
        }
    }

    pub fn observe(&mut self) -> Observation {
        self.readings += 1;
        if self
            .fault_every
            .is_some_and(|every| every > 0 && self.readings.is_multiple_of(every))
        {
            return Observation::Fault;
        }
        if self.noise_cm == 0 {
            return Observation::Distance(self.level_cm);
        }

        // xorshift64*
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        let draw = self.state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32;
        let span = u64::from(self.noise_cm) * 2 + 1;
        let offset = i64::try_from(draw % span).unwrap_or(0) - i64::from(self.noise_cm);
        let distance = (i64::from(self.level_cm) + offset).max(0);
        Observation::Distance(u32::try_from(distance).unwrap_or(u32::MAX))
    }
}

pub type SharedTank = Rc<RefCell<Tank>>;

struct EchoState {
    trigger_high_since: Option<u64>,
    echo: Option<(u64, u64)>,
}

/// Trigger/echo ranging module.
#[derive(Clone)]
pub struct PulseModule {
    clock: SimClock,
    tank: SharedTank,
    state: Rc<RefCell<EchoState>>,
}

/// Time between the end of the trigger pulse and the rising echo edge.
const ECHO_LEAD_US: u64 = 450;

impl PulseModule {
    pub fn new(clock: &SimClock, tank: &SharedTank) -> Self {
        Self {
            clock: clock.clone(),
            tank: Rc::clone(tank),
            state: Rc::new(RefCell::new(EchoState {
                trigger_high_since: None,
                echo: None,
            })),
        }
    }

    pub fn trigger(&self) -> TriggerPin {
        TriggerPin(self.clone())
    }

    pub fn echo(&self) -> EchoPin {
        EchoPin(self.clone())
    }

    fn fire(&self, now: u64) {
        let echo = match self.tank.borrow_mut().observe() {
            Observation::Distance(cm) => Some((now + ECHO_LEAD_US, echo_width_us(cm))),
            Observation::Fault => None,
        };
        self.state.borrow_mut().echo = echo;
    }
}

/// Echo width that decodes back to `cm` at 17 cm per 1000 µs.
pub fn echo_width_us(cm: u32) -> u64 {
    (u64::from(cm) * 1_000 + 16) / 17 + 10
}

pub struct TriggerPin(PulseModule);

impl digital::ErrorType for TriggerPin {
    type Error = Infallible;
}

impl OutputPin for TriggerPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let now = self.0.clock.now_us();
        let since = self.0.state.borrow_mut().trigger_high_since.take();
        if since.is_some_and(|since| now - since >= 10) {
            self.0.fire(now);
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.state.borrow_mut().trigger_high_since = Some(self.0.clock.now_us());
        Ok(())
    }
}

pub struct EchoPin(PulseModule);

impl digital::ErrorType for EchoPin {
    type Error = Infallible;
}

impl InputPin for EchoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let now = self.0.clock.now_us();
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

/// Framed serial ranging module answering each query byte with one frame.
pub struct SerialModule {
    tank: SharedTank,
    rx: VecDeque<u8>,
}

impl SerialModule {
    pub fn new(tank: &SharedTank) -> Self {
        Self {
            tank: Rc::clone(tank),
            rx: VecDeque::new(),
        }
    }

    fn answer(&mut self) {
        let observation = self.tank.borrow_mut().observe();
        let bytes = match observation {
            Observation::Distance(cm) => {
                let millimeters = u16::try_from(cm.saturating_mul(10)).unwrap_or(u16::MAX);
                SensorFrame::for_millimeters(millimeters).to_bytes()
            }
            Observation::Fault => {
                let mut bytes = SensorFrame::for_millimeters(1_000).to_bytes();
                bytes[3] = bytes[3].wrapping_add(1);
                bytes
            }
        };
        self.rx.extend(bytes);
    }
}

impl ErrorType for SerialModule {
    type Error = Infallible;
}

impl Write for SerialModule {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            if byte == 0x01 {
                self.answer();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Read for SerialModule {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let count = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl ReadReady for SerialModule {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

/// Outbound radio. Completed lines are collected until taken.
#[derive(Clone, Default)]
pub struct Radio {
    partial: Rc<RefCell<Vec<u8>>>,
    lines: Rc<RefCell<Vec<String>>>,
}

impl Radio {
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }
}

impl ErrorType for Radio {
    type Error = Infallible;
}

impl Write for Radio {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut partial = self.partial.borrow_mut();
        for &byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&partial).into_owned();
                self.lines.borrow_mut().push(line);
                partial.clear();
            } else {
                partial.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Power output whose level changes are collected until taken.
#[derive(Clone)]
pub struct Rail {
    name: &'static str,
    events: Rc<RefCell<Vec<(&'static str, bool)>>>,
    high: Rc<Cell<bool>>,
}

impl Rail {
    pub fn new(name: &'static str, events: &Rc<RefCell<Vec<(&'static str, bool)>>>) -> Self {
        Self {
            name,
            events: Rc::clone(events),
            high: Rc::new(Cell::new(false)),
        }
    }

    fn set(&self, high: bool) {
        if self.high.replace(high) != high {
            self.events.borrow_mut().push((self.name, high));
        }
    }
}

impl digital::ErrorType for Rail {
    type Error = Infallible;
}

impl OutputPin for Rail {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_tank_reports_level() {
        let mut tank = Tank::new(120, 0, None);
        assert_eq!(tank.observe(), Observation::Distance(120));
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut tank = Tank::new(100, 3, None);
        for _ in 0..500 {
            match tank.observe() {
                Observation::Distance(cm) => assert!((97..=103).contains(&cm), "{cm}"),
                Observation::Fault => panic!("no faults configured"),
            }
        }
    }

    #[test]
    fn faults_are_injected_periodically() {
        let mut tank = Tank::new(100, 0, Some(3));
        let faults: Vec<bool> = (0..6)
            .map(|_| tank.observe() == Observation::Fault)
            .collect();
        assert_eq!(faults, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn radio_splits_lines() {
        let mut radio = Radio::default();
        radio.write_all(b"1,42,43\n1,4").unwrap();
        radio.write_all(b"2,43\n").unwrap();
        assert_eq!(radio.take_lines(), vec!["1,42,43", "1,42,43"]);
        assert!(radio.take_lines().is_empty());
    }

    #[test]
    fn rails_report_only_level_changes() {
        let events = Rc::default();
        let mut rail = Rail::new("radio", &events);
        rail.set_low().unwrap();
        rail.set_high().unwrap();
        rail.set_high().unwrap();
        rail.set_low().unwrap();
        assert_eq!(*events.borrow(), vec![("radio", true), ("radio", false)]);
    }
}
