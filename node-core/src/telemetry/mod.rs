//! Outbound telemetry framing.
//!
//! A frame is ASCII `"<sensor_id>,<distance>,<checksum>\n"` with an additive,
//! unmodulated checksum `sensor_id + distance`. The checksum only catches a
//! subset of single-field corruptions; it stays as-is because deployed base
//! stations decode exactly this format.

use core::fmt::{self, Write as _};

use heapless::String;
use winnow::ascii::{dec_uint, line_ending};
use winnow::combinator::opt;
use winnow::error::ContextError;
use winnow::prelude::*;

pub mod transmitter;

pub use transmitter::{TransmitReport, Transmitter};

/// Capacity of an encoded frame; `"255,65535,65790\n"` is the longest.
pub const FRAME_CAPACITY: usize = 24;

/// Encoded frame ready for the radio link.
pub type FrameLine = String<FRAME_CAPACITY>;

/// One telemetry message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryFrame {
    pub sensor_id: u8,
    pub distance: u16,
    pub checksum: u32,
}

impl TelemetryFrame {
    /// Builds a frame with its checksum filled in.
    #[must_use]
    pub const fn new(sensor_id: u8, distance: u16) -> Self {
        Self {
            sensor_id,
            distance,
            checksum: Self::checksum_for(sensor_id, distance),
        }
    }

    #[must_use]
    pub const fn checksum_for(sensor_id: u8, distance: u16) -> u32 {
        sensor_id as u32 + distance as u32
    }

    /// Serializes the frame including the trailing line break.
    #[must_use]
    pub fn encode(&self) -> FrameLine {
        let mut line = FrameLine::new();
        // FRAME_CAPACITY covers the longest possible frame.
        let _ = writeln!(line, "{self}");
        line
    }

    /// Decodes one line; a trailing `\n` or `\r\n` is accepted.
    ///
    /// The checksum is decoded but not checked; see [`verify`](Self::verify).
    pub fn parse(line: &str) -> Result<Self, FrameParseError> {
        let (sensor_id, distance, checksum) = frame_fields()
            .parse(line)
            .map_err(|_| FrameParseError::Syntax)?;
        Ok(Self {
            sensor_id: u8::try_from(sensor_id).map_err(|_| FrameParseError::Overflow)?,
            distance: u16::try_from(distance).map_err(|_| FrameParseError::Overflow)?,
            checksum: u32::try_from(checksum).map_err(|_| FrameParseError::Overflow)?,
        })
    }

    /// Checks the additive checksum.
    pub fn verify(&self) -> Result<(), FrameParseError> {
        if self.checksum == Self::checksum_for(self.sensor_id, self.distance) {
            Ok(())
        } else {
            Err(FrameParseError::ChecksumMismatch)
        }
    }

    /// [`parse`](Self::parse) followed by [`verify`](Self::verify).
    pub fn parse_verified(line: &str) -> Result<Self, FrameParseError> {
        let frame = Self::parse(line)?;
        frame.verify()?;
        Ok(frame)
    }
}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.sensor_id, self.distance, self.checksum)
    }
}

/// Why a received line is not a usable frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameParseError {
    /// Not three comma-separated decimal fields.
    Syntax,
    /// A field does not fit its wire type.
    Overflow,
    /// Checksum does not equal `sensor_id + distance`.
    ChecksumMismatch,
}

impl fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameParseError::Syntax => f.write_str("malformed telemetry frame"),
            FrameParseError::Overflow => f.write_str("telemetry field out of range"),
            FrameParseError::ChecksumMismatch => f.write_str("telemetry checksum mismatch"),
        }
    }
}

fn frame_fields<'a>() -> impl Parser<&'a str, (u64, u64, u64), ContextError> {
    move |input: &mut &'a str| {
        let sensor_id: u64 = dec_uint.parse_next(input)?;
        ','.parse_next(input)?;
        let distance: u64 = dec_uint.parse_next(input)?;
        ','.parse_next(input)?;
        let checksum: u64 = dec_uint.parse_next(input)?;
        opt(line_ending).parse_next(input)?;
        Ok((sensor_id, distance, checksum))
    }
}
