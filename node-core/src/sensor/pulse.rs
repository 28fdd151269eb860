//! Trigger/echo ultrasonic ranging.
//!
//! The trigger line is held low briefly, pulsed high for 10 µs, and released.
//! The module answers with a high pulse on the echo line whose width is the
//! round-trip time of flight. Both the wait for the rising edge and the pulse
//! itself are bounded by the echo timeout.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::{DistanceSensor, MicrosClock, RawSample, SampleStatus};
use crate::retry::RetryPolicy;

/// Low time before the trigger pulse.
pub const TRIGGER_SETTLE_US: u32 = 5;

/// Width of the trigger pulse.
pub const TRIGGER_PULSE_US: u32 = 10;

/// Half the speed of sound at room temperature: 0.034 cm/µs / 2, in cm per 1000 µs.
pub const HALF_SOUND_SPEED_CM_PER_MS: u64 = 17;

/// Converts an echo pulse width to centimeters, truncating.
#[must_use]
pub const fn echo_to_centimeters(echo_us: u64) -> u64 {
    echo_us.saturating_mul(HALF_SOUND_SPEED_CM_PER_MS) / 1_000
}

/// Pulse-timing strategy over `embedded-hal` pins.
pub struct TimedPulseSensor<Trig, Echo, D, C> {
    trigger: Trig,
    echo: Echo,
    delay: D,
    clock: C,
    echo_wait: RetryPolicy,
    tank_height: u16,
}

impl<Trig, Echo, D, C> TimedPulseSensor<Trig, Echo, D, C>
where
    Trig: OutputPin,
    Echo: InputPin,
    D: DelayNs,
    C: MicrosClock,
{
    /// `echo_wait.timeout` bounds the whole echo measurement.
    pub fn new(
        trigger: Trig,
        echo: Echo,
        delay: D,
        clock: C,
        echo_wait: RetryPolicy,
        tank_height: u16,
    ) -> Self {
        Self {
            trigger,
            echo,
            delay,
            clock,
            echo_wait,
            tank_height,
        }
    }

    /// Emits the trigger pulse and measures the echo width in microseconds.
    pub fn measure_echo_micros(&mut self) -> Result<u64, SampleStatus> {
        self.trigger.set_low().map_err(|_| SampleStatus::BusFault)?;
        self.delay.delay_us(TRIGGER_SETTLE_US);
        self.trigger.set_high().map_err(|_| SampleStatus::BusFault)?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(|_| SampleStatus::BusFault)?;

        let started = self.clock.now_micros();

        while !self.echo.is_high().map_err(|_| SampleStatus::BusFault)? {
            let now = self.clock.now_micros();
            if self.echo_wait.timed_out(now.saturating_sub(started)) {
                return Err(SampleStatus::Timeout);
            }
        }

        let rising = self.clock.now_micros();
        while self.echo.is_high().map_err(|_| SampleStatus::BusFault)? {
            let now = self.clock.now_micros();
            if self.echo_wait.timed_out(now.saturating_sub(started)) {
                return Err(SampleStatus::Timeout);
            }
        }

        Ok(self.clock.now_micros().saturating_sub(rising))
    }

    /// Releases the pins and timing resources.
    pub fn release(self) -> (Trig, Echo, D, C) {
        (self.trigger, self.echo, self.delay, self.clock)
    }
}

impl<Trig, Echo, D, C> DistanceSensor for TimedPulseSensor<Trig, Echo, D, C>
where
    Trig: OutputPin,
    Echo: InputPin,
    D: DelayNs,
    C: MicrosClock,
{
    fn acquire_distance(&mut self) -> RawSample {
        match self.measure_echo_micros() {
            Ok(echo_us) => {
                let centimeters = echo_to_centimeters(echo_us);
                RawSample::from_reading(
                    u32::try_from(centimeters).unwrap_or(u32::MAX),
                    self.tank_height,
                )
            }
            Err(status) => RawSample::rejected(status, self.tank_height),
        }
    }
}
