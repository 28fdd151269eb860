//! Distance acquisition behind a single capability trait.
//!
//! A deployment wires exactly one [`DistanceSensor`] implementation:
//! [`pulse::TimedPulseSensor`] for trigger/echo ranging modules or
//! [`framed::FramedSerialSensor`] for modules answering a serial query with a
//! checksummed frame. Both fold every failure (timeout, bad frame, reading out
//! of range, bus error) into the `tank_height` sentinel so the caller never
//! branches on the sensor type.

use core::fmt;

pub mod framed;
pub mod pulse;

pub use framed::{FrameError, FramedSerialSensor, SensorFrame};
pub use pulse::TimedPulseSensor;

/// Why a sample is or is not usable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleStatus {
    Valid,
    /// No echo or no response within the bounded wait.
    Timeout,
    /// Framed response failed its checksum.
    ChecksumMismatch,
    /// Framed response did not begin with the start byte.
    BadStartByte,
    /// Computed distance outside `(0, tank_height)`.
    OutOfRange,
    /// A GPIO or serial primitive reported an error.
    BusFault,
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleStatus::Valid => f.write_str("valid"),
            SampleStatus::Timeout => f.write_str("timeout"),
            SampleStatus::ChecksumMismatch => f.write_str("checksum-mismatch"),
            SampleStatus::BadStartByte => f.write_str("bad-start-byte"),
            SampleStatus::OutOfRange => f.write_str("out-of-range"),
            SampleStatus::BusFault => f.write_str("bus-fault"),
        }
    }
}

/// One distance reading in centimeters.
///
/// Invalid samples always carry the sentinel distance.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub distance_cm: u16,
    pub status: SampleStatus,
}

impl RawSample {
    /// Applies the `(0, tank_height)` range check to a converted reading.
    #[must_use]
    pub fn from_reading(distance_cm: u32, tank_height: u16) -> Self {
        if distance_cm > 0 && distance_cm < u32::from(tank_height) {
            Self {
                distance_cm: u16::try_from(distance_cm).unwrap_or(tank_height),
                status: SampleStatus::Valid,
            }
        } else {
            Self::rejected(SampleStatus::OutOfRange, tank_height)
        }
    }

    /// Sentinel sample carrying the failure reason.
    #[must_use]
    pub const fn rejected(status: SampleStatus, tank_height: u16) -> Self {
        Self {
            distance_cm: tank_height,
            status,
        }
    }

    pub const fn is_valid(&self) -> bool {
        matches!(self.status, SampleStatus::Valid)
    }
}

/// Capability shared by both acquisition strategies.
pub trait DistanceSensor {
    /// Acquires one sample. Never blocks without bound and never fails hard.
    fn acquire_distance(&mut self) -> RawSample;
}

impl<T> DistanceSensor for &mut T
where
    T: DistanceSensor + ?Sized,
{
    fn acquire_distance(&mut self) -> RawSample {
        (**self).acquire_distance()
    }
}

/// Free-running microsecond counter used for echo timing.
pub trait MicrosClock {
    /// Monotonic microseconds since an arbitrary epoch.
    fn now_micros(&mut self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_readings_pass_through() {
        for distance in [1, 42, 199] {
            let sample = RawSample::from_reading(distance, 200);
            assert!(sample.is_valid());
            assert_eq!(u32::from(sample.distance_cm), distance);
        }
    }

    #[test]
    fn out_of_range_readings_become_sentinel() {
        for distance in [0, 200, 250, u32::MAX] {
            let sample = RawSample::from_reading(distance, 200);
            assert_eq!(sample.status, SampleStatus::OutOfRange);
            assert_eq!(sample.distance_cm, 200);
        }
    }

    #[test]
    fn rejected_sample_carries_status() {
        let sample = RawSample::rejected(SampleStatus::Timeout, 190);
        assert!(!sample.is_valid());
        assert_eq!(sample.distance_cm, 190);
    }
}
