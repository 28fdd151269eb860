//! Framed serial ultrasonic protocol.
//!
//! The host writes a single query byte; the module answers with
//! `[0xFF, high, low, checksum]` where `checksum = (0xFF + high + low) mod 256`
//! and `high:low` is the distance in millimeters. A silent module is queried
//! again after every poll interval until the attempt budget runs out.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use super::{DistanceSensor, RawSample, SampleStatus};
use crate::config::{DEFAULT_QUERY_BYTE, SensorTiming};
use crate::retry::RetryPolicy;

/// Upper bound on stale bytes discarded before a query.
pub const MAX_STALE_BYTES: usize = 64;

/// Integrity failures of a response frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    BadStartByte(u8),
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BadStartByte(byte) => write!(f, "unexpected start byte {byte:#04x}"),
            FrameError::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum {actual:#04x} != {expected:#04x}")
            }
        }
    }
}

impl From<FrameError> for SampleStatus {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::BadStartByte(_) => SampleStatus::BadStartByte,
            FrameError::ChecksumMismatch { .. } => SampleStatus::ChecksumMismatch,
        }
    }
}

/// Four-byte response frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorFrame {
    pub start: u8,
    pub high: u8,
    pub low: u8,
    pub checksum: u8,
}

impl SensorFrame {
    pub const START_BYTE: u8 = 0xFF;
    pub const LEN: usize = 4;

    /// Additive checksum over the first three bytes, modulo 256.
    #[must_use]
    pub const fn checksum_for(start: u8, high: u8, low: u8) -> u8 {
        start.wrapping_add(high).wrapping_add(low)
    }

    /// Builds the frame a module would send for `millimeters`.
    #[must_use]
    pub const fn for_millimeters(millimeters: u16) -> Self {
        let [high, low] = millimeters.to_be_bytes();
        Self {
            start: Self::START_BYTE,
            high,
            low,
            checksum: Self::checksum_for(Self::START_BYTE, high, low),
        }
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self {
            start: bytes[0],
            high: bytes[1],
            low: bytes[2],
            checksum: bytes[3],
        }
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::LEN] {
        [self.start, self.high, self.low, self.checksum]
    }

    /// Validates the frame and returns the distance in millimeters.
    pub fn millimeters(&self) -> Result<u16, FrameError> {
        if self.start != Self::START_BYTE {
            return Err(FrameError::BadStartByte(self.start));
        }
        let expected = Self::checksum_for(self.start, self.high, self.low);
        if expected != self.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected,
                actual: self.checksum,
            });
        }
        Ok(u16::from_be_bytes([self.high, self.low]))
    }
}

/// Millimeters to centimeters, rounding half up.
#[must_use]
pub const fn millimeters_to_centimeters(millimeters: u16) -> u32 {
    (millimeters as u32 + 5) / 10
}

/// Framed-serial strategy over an `embedded-io` byte port.
pub struct FramedSerialSensor<S, D> {
    port: S,
    delay: D,
    query: RetryPolicy,
    frame_byte: RetryPolicy,
    query_byte: u8,
    tank_height: u16,
}

impl<S, D> FramedSerialSensor<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    pub fn new(port: S, delay: D, timing: &SensorTiming, tank_height: u16) -> Self {
        Self {
            port,
            delay,
            query: timing.query,
            frame_byte: timing.frame_byte,
            query_byte: DEFAULT_QUERY_BYTE,
            tank_height,
        }
    }

    /// Overrides the query byte for modules using a different trigger command.
    #[must_use]
    pub fn with_query_byte(mut self, query_byte: u8) -> Self {
        self.query_byte = query_byte;
        self
    }

    /// Queries the module and reads one response frame.
    pub fn read_frame(&mut self) -> Result<SensorFrame, SampleStatus> {
        self.discard_stale()?;
        self.query()?;

        let mut bytes = [0u8; SensorFrame::LEN];
        bytes[0] = self.read_byte()?;
        if bytes[0] != SensorFrame::START_BYTE {
            return Err(FrameError::BadStartByte(bytes[0]).into());
        }
        for slot in &mut bytes[1..] {
            *slot = self.read_byte()?;
        }
        Ok(SensorFrame::from_bytes(bytes))
    }

    pub fn release(self) -> (S, D) {
        (self.port, self.delay)
    }

    fn query(&mut self) -> Result<(), SampleStatus> {
        for _ in self.query.attempt_indices() {
            self.port
                .write_all(&[self.query_byte])
                .map_err(|_| SampleStatus::BusFault)?;
            self.port.flush().map_err(|_| SampleStatus::BusFault)?;
            self.delay.delay_ms(self.query.interval_ms());
            if self.port.read_ready().map_err(|_| SampleStatus::BusFault)? {
                return Ok(());
            }
        }
        Err(SampleStatus::Timeout)
    }

    fn read_byte(&mut self) -> Result<u8, SampleStatus> {
        let mut byte = [0u8; 1];
        for _ in self.frame_byte.attempt_indices() {
            if self.port.read_ready().map_err(|_| SampleStatus::BusFault)? {
                match self.port.read(&mut byte) {
                    Ok(1) => return Ok(byte[0]),
                    Ok(_) => {}
                    Err(_) => return Err(SampleStatus::BusFault),
                }
            }
            self.delay.delay_us(self.frame_byte.interval_us());
        }
        Err(SampleStatus::Timeout)
    }

    fn discard_stale(&mut self) -> Result<(), SampleStatus> {
        let mut byte = [0u8; 1];
        for _ in 0..MAX_STALE_BYTES {
            if !self.port.read_ready().map_err(|_| SampleStatus::BusFault)? {
                break;
            }
            self.port
                .read(&mut byte)
                .map_err(|_| SampleStatus::BusFault)?;
        }
        Ok(())
    }
}

impl<S, D> DistanceSensor for FramedSerialSensor<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    fn acquire_distance(&mut self) -> RawSample {
        let millimeters = self
            .read_frame()
            .and_then(|frame| frame.millimeters().map_err(SampleStatus::from));
        match millimeters {
            Ok(millimeters) => {
                RawSample::from_reading(millimeters_to_centimeters(millimeters), self.tank_height)
            }
            Err(status) => RawSample::rejected(status, self.tank_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_frame_decodes_big_endian_millimeters() {
        let frame = SensorFrame::from_bytes([0xFF, 0x07, 0xD0, 0xD6]);
        assert_eq!(frame.millimeters(), Ok(2_000));
    }

    #[test]
    fn checksum_wraps_modulo_256() {
        assert_eq!(SensorFrame::checksum_for(0xFF, 0x01, 0x02), 0x02);
        let frame = SensorFrame::for_millimeters(500);
        assert_eq!(frame.to_bytes(), [0xFF, 0x01, 0xF4, 0xF4]);
    }

    #[test]
    fn wrong_start_byte_is_rejected() {
        let frame = SensorFrame::from_bytes([0xFE, 0x01, 0xF4, 0xF3]);
        assert_eq!(frame.millimeters(), Err(FrameError::BadStartByte(0xFE)));
    }

    #[test]
    fn wrong_checksum_is_rejected() {
        let frame = SensorFrame::from_bytes([0xFF, 0x01, 0xF4, 0x00]);
        assert_eq!(
            frame.millimeters(),
            Err(FrameError::ChecksumMismatch {
                expected: 0xF4,
                actual: 0x00
            })
        );
    }

    #[test]
    fn centimeter_conversion_rounds_half_up() {
        assert_eq!(millimeters_to_centimeters(424), 42);
        assert_eq!(millimeters_to_centimeters(425), 43);
        assert_eq!(millimeters_to_centimeters(u16::MAX), 6_554);
    }
}
