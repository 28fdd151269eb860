//! Blind repeated transmission of telemetry frames.

use embedded_hal::delay::DelayNs;
use embedded_io::Write;

use super::TelemetryFrame;
use crate::retry::RetryPolicy;

/// Outcome of one [`Transmitter::send`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransmitReport {
    pub frame: TelemetryFrame,
    /// Repetitions attempted.
    pub attempted: u16,
    /// Repetitions fully written and flushed.
    pub written: u16,
    /// Repetitions the link reported as failed.
    pub failed: u16,
}

impl TransmitReport {
    pub const fn all_written(&self) -> bool {
        self.failed == 0 && self.written == self.attempted
    }
}

/// Writes frames to an outbound-only radio link.
pub struct Transmitter<W, D> {
    link: W,
    delay: D,
    policy: RetryPolicy,
}

impl<W, D> Transmitter<W, D>
where
    W: Write,
    D: DelayNs,
{
    /// `policy.attempts` is the repetition count, `policy.interval` the pause after each write.
    pub fn new(link: W, delay: D, policy: RetryPolicy) -> Self {
        Self {
            link,
            delay,
            policy,
        }
    }

    /// Writes the frame for `(sensor_id, distance)` once per repetition.
    ///
    /// The pause follows every write, including the last one, so the radio
    /// has drained before its power is cut. Link errors are counted, never returned.
    pub fn send(&mut self, sensor_id: u8, distance: u16) -> TransmitReport {
        let frame = TelemetryFrame::new(sensor_id, distance);
        let line = frame.encode();
        let mut report = TransmitReport {
            frame,
            attempted: 0,
            written: 0,
            failed: 0,
        };

        for _ in self.policy.attempt_indices() {
            report.attempted += 1;
            let outcome = self
                .link
                .write_all(line.as_bytes())
                .and_then(|()| self.link.flush());
            match outcome {
                Ok(()) => report.written += 1,
                Err(_) => report.failed += 1,
            }
            self.delay.delay_ms(self.policy.interval_ms());
        }

        report
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn release(self) -> (W, D) {
        (self.link, self.delay)
    }
}
