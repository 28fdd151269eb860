//! One node: power gate, sensor, filter and transmitter wired to the scheduler.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::Write;

use crate::config::{ConfigError, NodeConfig, SentinelPolicy, TransmitTrigger};
use crate::filter::{SmoothingFilter, round_distance};
use crate::power::{PowerFault, PowerGate};
use crate::scheduler::{DutyCycleScheduler, WakeSource};
use crate::sensor::{DistanceSensor, SampleStatus};
use crate::telemetry::{TransmitReport, Transmitter};

/// Summary of one active window.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WindowReport {
    /// Samples acquired in this window.
    pub samples: u8,
    /// Samples that passed validation and updated the filter.
    pub valid_samples: u8,
    /// Status of the last sample acquired.
    pub last_status: SampleStatus,
    /// Filter output after the last valid sample, if any.
    pub smoothed: Option<f32>,
    /// Rounded and range-checked distance handed to the transmitter.
    pub distance: u16,
    /// `None` when the window was suppressed or held back.
    pub transmit: Option<TransmitReport>,
    /// The distance matched the last frame sent and no heartbeat was due.
    pub unchanged: bool,
    /// First power rail failure seen while gating the window.
    pub power_fault: Option<PowerFault>,
}

impl WindowReport {
    pub const fn transmitted(&self) -> bool {
        self.transmit.is_some()
    }
}

/// A complete telemetry node.
///
/// `S` is the single acquisition strategy of this build. Rails of type `P`
/// are gated through a [`PowerGate`] pausing on `PD`; frames go out on `W`
/// paced by `TD`.
pub struct TelemetryNode<S, P, PD, W, TD, const N: usize> {
    config: NodeConfig,
    sensor: S,
    power: PowerGate<P, PD, N>,
    filter: SmoothingFilter,
    transmitter: Transmitter<W, TD>,
    last_sent: Option<u16>,
    quiet_windows: u16,
}

impl<S, P, PD, W, TD, const N: usize> TelemetryNode<S, P, PD, W, TD, N>
where
    S: DistanceSensor,
    P: OutputPin,
    PD: DelayNs,
    W: Write,
    TD: DelayNs,
{
    /// Validates `config` and assembles every component from it.
    pub fn from_config(
        config: NodeConfig,
        sensor: S,
        rails: [P; N],
        power_delay: PD,
        link: W,
        link_delay: TD,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            power: PowerGate::new(rails, power_delay, config.power_settle, config.power_policy),
            filter: SmoothingFilter::new(config.alpha, config.smoothing, config.filter_seed),
            transmitter: Transmitter::new(link, link_delay, config.transmit),
            sensor,
            config,
            last_sent: None,
            quiet_windows: 0,
        })
    }

    /// Drives the rails to their start-up level for the configured power policy.
    pub fn start(&mut self) -> Result<(), PowerFault> {
        self.power.start()
    }

    /// Runs one acquire-filter-transmit window.
    pub fn run_window(&mut self) -> WindowReport {
        let sentinel = self.config.sentinel();
        let mut power_fault = self.power.begin_window().err();

        let mut report = WindowReport {
            samples: 0,
            valid_samples: 0,
            last_status: SampleStatus::Timeout,
            smoothed: None,
            distance: sentinel,
            transmit: None,
            unchanged: false,
            power_fault: None,
        };

        for _ in 0..self.config.measurements_per_window {
            let sample = self.sensor.acquire_distance();
            report.samples += 1;
            report.last_status = sample.status;
            if sample.is_valid() {
                report.valid_samples += 1;
                report.smoothed = Some(self.filter.update(f32::from(sample.distance_cm)));
            }
        }

        if let Some(smoothed) = report.smoothed {
            report.distance = clamp_to_tank(round_distance(smoothed), sentinel);
        }

        let suppress = report.distance == sentinel
            && self.config.sentinel_policy == SentinelPolicy::Suppress;
        if !suppress {
            if self.transmit_due(report.distance) {
                report.transmit = Some(
                    self.transmitter
                        .send(self.config.sensor_id, report.distance),
                );
            } else {
                report.unchanged = true;
            }
        }

        if let Err(fault) = self.power.end_window() {
            power_fault = power_fault.or(Some(fault));
        }
        report.power_fault = power_fault;
        report
    }

    fn transmit_due(&mut self, distance: u16) -> bool {
        let TransmitTrigger::OnChange { heartbeat_windows } = self.config.transmit_trigger else {
            return true;
        };
        self.quiet_windows = self.quiet_windows.saturating_add(1);
        if self.last_sent == Some(distance) && self.quiet_windows < heartbeat_windows {
            return false;
        }
        self.last_sent = Some(distance);
        self.quiet_windows = 0;
        true
    }

    /// Sleeps until the scheduler opens a window, runs it, and closes it.
    pub fn serve_window<K>(&mut self, scheduler: &DutyCycleScheduler, wake: &mut K) -> WindowReport
    where
        K: WakeSource,
    {
        scheduler.wait_for_window(wake);
        let report = self.run_window();
        scheduler.finish_window();
        report
    }

    /// Serves windows forever, handing each report to `observer`.
    pub fn run<K, F>(&mut self, scheduler: &DutyCycleScheduler, wake: &mut K, mut observer: F) -> !
    where
        K: WakeSource,
        F: FnMut(&WindowReport),
    {
        loop {
            let report = self.serve_window(scheduler, wake);
            observer(&report);
        }
    }

    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub const fn filter(&self) -> &SmoothingFilter {
        &self.filter
    }

    pub const fn power(&self) -> &PowerGate<P, PD, N> {
        &self.power
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Tears the node down into its sensor, power gate and transmitter.
    pub fn release(self) -> (S, PowerGate<P, PD, N>, Transmitter<W, TD>) {
        (self.sensor, self.power, self.transmitter)
    }
}

/// Re-applies the `(0, tank_height)` range check after rounding.
const fn clamp_to_tank(distance: u16, tank_height: u16) -> u16 {
    if distance == 0 || distance >= tank_height {
        tank_height
    } else {
        distance
    }
}
