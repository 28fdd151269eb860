//! Compile-time configuration for a telemetry node.
//!
//! Every deployment constant lives in [`NodeConfig`]. Values are assembled with
//! `const fn` builders so firmware can keep the configuration in flash, and
//! [`NodeConfig::validate`] is called once at start-up before any component is
//! constructed.

use core::{fmt, time::Duration};

use crate::filter::{FilterSeed, SmoothingMode};
use crate::power::PowerPolicy;
use crate::retry::RetryPolicy;

/// Query byte understood by framed serial ranging modules.
pub const DEFAULT_QUERY_BYTE: u8 = 0x01;

/// Settle time after energizing a peripheral rail.
pub const DEFAULT_POWER_SETTLE: Duration = Duration::from_millis(100);

/// Pause after each telemetry frame so the radio can drain its buffer.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on the echo wait of a pulse-timing sensor.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(30);

/// Pause between query re-sends while a framed module stays silent.
pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_millis(50);

/// Number of query attempts before a framed read is declared timed out.
pub const DEFAULT_QUERY_ATTEMPTS: u16 = 20;

/// What a window does when it produced no usable reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SentinelPolicy {
    /// Transmit `tank_height` so the receiver sees "no usable reading".
    Transmit,
    /// Stay silent until a valid reading is available.
    Suppress,
}

/// When a window hands its distance to the transmitter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitTrigger {
    /// Every window that is not suppressed transmits.
    EveryWindow,
    /// Transmit when the distance differs from the last one sent, and
    /// otherwise once every `heartbeat_windows` windows.
    OnChange { heartbeat_windows: u16 },
}

/// Timing knobs for both acquisition strategies.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorTiming {
    /// Echo wait of the pulse-timing strategy (only `timeout` is used).
    pub echo: RetryPolicy,
    /// Query/poll loop of the framed strategy.
    pub query: RetryPolicy,
    /// Wait applied to every byte after the first one of a framed response.
    pub frame_byte: RetryPolicy,
}

impl SensorTiming {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            echo: RetryPolicy::once().with_timeout(DEFAULT_ECHO_TIMEOUT),
            query: RetryPolicy::new(DEFAULT_QUERY_ATTEMPTS, DEFAULT_QUERY_INTERVAL),
            frame_byte: RetryPolicy::new(10, Duration::from_millis(2)),
        }
    }
}

impl Default for SensorTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Static description of a single node deployment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodeConfig {
    /// Identifier prefixed to every telemetry frame.
    pub sensor_id: u8,
    /// Exclusive upper bound for valid distances, doubling as the sentinel.
    pub tank_height: u16,
    /// Smoothing coefficient in `(0, 1]`.
    pub alpha: f32,
    /// Whether readings pass through the exponential filter.
    pub smoothing: SmoothingMode,
    /// Initial filter state.
    pub filter_seed: FilterSeed,
    /// Timer interrupts per telemetry window.
    pub max_sleep_rounds: u32,
    /// Samples acquired (and filtered) per window.
    pub measurements_per_window: u8,
    /// Repetition count and pacing for outbound frames.
    pub transmit: RetryPolicy,
    /// Power gating policy for the peripheral rails.
    pub power_policy: PowerPolicy,
    /// Delay after enabling power before peripherals are used.
    pub power_settle: Duration,
    /// Behavior for windows without a valid reading.
    pub sentinel_policy: SentinelPolicy,
    /// Which windows transmit at all.
    pub transmit_trigger: TransmitTrigger,
    /// Acquisition timeouts and pacing.
    pub sensor: SensorTiming,
}

impl NodeConfig {
    /// Baseline configuration: smoothing off, one frame per window, window-only power.
    #[must_use]
    pub const fn new(sensor_id: u8, tank_height: u16) -> Self {
        Self {
            sensor_id,
            tank_height,
            alpha: 0.1,
            smoothing: SmoothingMode::Bypass,
            filter_seed: FilterSeed::Zero,
            max_sleep_rounds: 1,
            measurements_per_window: 1,
            transmit: RetryPolicy::new(1, DEFAULT_SEND_INTERVAL),
            power_policy: PowerPolicy::ActiveWindowOnly,
            power_settle: DEFAULT_POWER_SETTLE,
            sentinel_policy: SentinelPolicy::Transmit,
            transmit_trigger: TransmitTrigger::EveryWindow,
            sensor: SensorTiming::new(),
        }
    }

    /// Low-power node with a framed serial module behind a gated rail.
    ///
    /// Nine one-second watchdog periods per window, ten blind repetitions,
    /// and raw readings forwarded without smoothing.
    #[must_use]
    pub const fn serial_sensor_preset() -> Self {
        Self::new(1, 200).with_sleep_rounds(9).with_repetitions(10)
    }

    /// Mains-powered node with a pulse-timing sensor and a permanently powered radio.
    #[must_use]
    pub const fn pulse_sensor_preset() -> Self {
        Self::new(1, 190)
            .with_smoothing(0.1)
            .with_power_policy(PowerPolicy::AlwaysOn)
    }

    /// Enables exponential smoothing with the given coefficient.
    #[must_use]
    pub const fn with_smoothing(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self.smoothing = SmoothingMode::Exponential;
        self
    }

    /// Forwards raw readings unchanged.
    #[must_use]
    pub const fn without_smoothing(mut self) -> Self {
        self.smoothing = SmoothingMode::Bypass;
        self
    }

    #[must_use]
    pub const fn with_filter_seed(mut self, seed: FilterSeed) -> Self {
        self.filter_seed = seed;
        self
    }

    #[must_use]
    pub const fn with_sleep_rounds(mut self, rounds: u32) -> Self {
        self.max_sleep_rounds = rounds;
        self
    }

    #[must_use]
    pub const fn with_measurements(mut self, count: u8) -> Self {
        self.measurements_per_window = count;
        self
    }

    /// Sets how many times each frame is written to the radio.
    #[must_use]
    pub const fn with_repetitions(mut self, count: u16) -> Self {
        self.transmit.attempts = count;
        self
    }

    #[must_use]
    pub const fn with_power_policy(mut self, policy: PowerPolicy) -> Self {
        self.power_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_sentinel_policy(mut self, policy: SentinelPolicy) -> Self {
        self.sentinel_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_transmit_trigger(mut self, trigger: TransmitTrigger) -> Self {
        self.transmit_trigger = trigger;
        self
    }

    #[must_use]
    pub const fn with_sensor_timing(mut self, timing: SensorTiming) -> Self {
        self.sensor = timing;
        self
    }

    /// Sentinel distance reported when no usable reading exists.
    #[must_use]
    pub const fn sentinel(&self) -> u16 {
        self.tank_height
    }

    /// Checks the invariants every component relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tank_height == 0 {
            return Err(ConfigError::ZeroTankHeight);
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::AlphaOutOfRange);
        }
        if self.max_sleep_rounds == 0 {
            return Err(ConfigError::ZeroSleepRounds);
        }
        if self.measurements_per_window == 0 {
            return Err(ConfigError::ZeroMeasurements);
        }
        if self.transmit.attempts == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }
        if matches!(
            self.transmit_trigger,
            TransmitTrigger::OnChange {
                heartbeat_windows: 0
            }
        ) {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if self.sensor.query.attempts == 0 || self.sensor.frame_byte.attempts == 0 {
            return Err(ConfigError::ZeroQueryAttempts);
        }
        if self.sensor.echo.timeout.is_none_or(|timeout| timeout.is_zero()) {
            return Err(ConfigError::MissingEchoTimeout);
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::serial_sensor_preset()
    }
}

/// Invariant violations reported by [`NodeConfig::validate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroTankHeight,
    AlphaOutOfRange,
    ZeroSleepRounds,
    ZeroMeasurements,
    ZeroRepetitions,
    ZeroHeartbeat,
    ZeroQueryAttempts,
    MissingEchoTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTankHeight => f.write_str("tank height must be non-zero"),
            ConfigError::AlphaOutOfRange => f.write_str("smoothing alpha must be in (0, 1]"),
            ConfigError::ZeroSleepRounds => f.write_str("sleep rounds must be at least 1"),
            ConfigError::ZeroMeasurements => {
                f.write_str("measurements per window must be at least 1")
            }
            ConfigError::ZeroRepetitions => f.write_str("transmit repetitions must be at least 1"),
            ConfigError::ZeroHeartbeat => f.write_str("heartbeat must be at least 1 window"),
            ConfigError::ZeroQueryAttempts => f.write_str("sensor query attempts must be at least 1"),
            ConfigError::MissingEchoTimeout => f.write_str("echo wait requires a non-zero timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert_eq!(NodeConfig::serial_sensor_preset().validate(), Ok(()));
        assert_eq!(NodeConfig::pulse_sensor_preset().validate(), Ok(()));
    }

    #[test]
    fn serial_preset_matches_low_power_deployment() {
        let config = NodeConfig::serial_sensor_preset();
        assert_eq!(config.sensor_id, 1);
        assert_eq!(config.sentinel(), 200);
        assert_eq!(config.max_sleep_rounds, 9);
        assert_eq!(config.transmit.attempts, 10);
        assert_eq!(config.transmit.interval, Duration::from_millis(100));
        assert_eq!(config.smoothing, SmoothingMode::Bypass);
        assert_eq!(config.power_policy, PowerPolicy::ActiveWindowOnly);
        assert_eq!(config.sentinel_policy, SentinelPolicy::Transmit);
        assert_eq!(config.transmit_trigger, TransmitTrigger::EveryWindow);
    }

    #[test]
    fn pulse_preset_smooths_and_keeps_power_on() {
        let config = NodeConfig::pulse_sensor_preset();
        assert_eq!(config.sentinel(), 190);
        assert_eq!(config.smoothing, SmoothingMode::Exponential);
        assert_eq!(config.power_policy, PowerPolicy::AlwaysOn);
        assert_eq!(config.sentinel_policy, SentinelPolicy::Transmit);
    }

    #[test]
    fn alpha_bounds_are_enforced() {
        let base = NodeConfig::new(1, 200);
        assert_eq!(base.with_smoothing(1.0).validate(), Ok(()));
        assert_eq!(
            base.with_smoothing(0.0).validate(),
            Err(ConfigError::AlphaOutOfRange)
        );
        assert_eq!(
            base.with_smoothing(1.5).validate(),
            Err(ConfigError::AlphaOutOfRange)
        );
        assert_eq!(
            base.with_smoothing(f32::NAN).validate(),
            Err(ConfigError::AlphaOutOfRange)
        );
    }

    #[test]
    fn zero_counts_are_rejected() {
        let base = NodeConfig::new(1, 200);
        assert_eq!(
            NodeConfig::new(1, 0).validate(),
            Err(ConfigError::ZeroTankHeight)
        );
        assert_eq!(
            base.with_sleep_rounds(0).validate(),
            Err(ConfigError::ZeroSleepRounds)
        );
        assert_eq!(
            base.with_measurements(0).validate(),
            Err(ConfigError::ZeroMeasurements)
        );
        assert_eq!(
            base.with_repetitions(0).validate(),
            Err(ConfigError::ZeroRepetitions)
        );
        let on_change = |heartbeat_windows| {
            base.with_transmit_trigger(TransmitTrigger::OnChange { heartbeat_windows })
        };
        assert_eq!(on_change(0).validate(), Err(ConfigError::ZeroHeartbeat));
        assert_eq!(on_change(1).validate(), Ok(()));
    }

    #[test]
    fn echo_wait_needs_a_timeout() {
        let mut timing = SensorTiming::new();
        timing.echo = RetryPolicy::once();
        let config = NodeConfig::new(1, 200).with_sensor_timing(timing);
        assert_eq!(config.validate(), Err(ConfigError::MissingEchoTimeout));
    }
}
