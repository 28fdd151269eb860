//! Peripheral rail gating around each active window.

use core::{fmt, time::Duration};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// When the gated rails are energized.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerPolicy {
    /// Energize once at start-up and never cut power.
    AlwaysOn,
    /// Energize at the start of every window and cut power at its end.
    ActiveWindowOnly,
}

/// A power output refused a level change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerFault {
    /// Index of the first output that failed.
    pub rail: usize,
}

impl fmt::Display for PowerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "power rail {} did not switch", self.rail)
    }
}

/// Active-high outputs switched together, followed by a settle delay on enable.
pub struct PowerGate<P, D, const N: usize> {
    rails: [P; N],
    delay: D,
    settle: Duration,
    policy: PowerPolicy,
    enabled: bool,
}

impl<P, D, const N: usize> PowerGate<P, D, N>
where
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(rails: [P; N], delay: D, settle: Duration, policy: PowerPolicy) -> Self {
        Self {
            rails,
            delay,
            settle,
            policy,
            enabled: false,
        }
    }

    /// Drives the rails to their idle level for the configured policy.
    pub fn start(&mut self) -> Result<(), PowerFault> {
        match self.policy {
            PowerPolicy::AlwaysOn => self.enable(),
            PowerPolicy::ActiveWindowOnly => self.disable(),
        }
    }

    /// Drives every rail high, then waits for the settle delay.
    ///
    /// When a rail refuses, the rails raised before it are driven low again
    /// and the gate stays disabled, so the next window retries from scratch.
    pub fn enable(&mut self) -> Result<(), PowerFault> {
        if let Some(rail) = self.rails.iter_mut().position(|pin| pin.set_high().is_err()) {
            for pin in &mut self.rails[..rail] {
                let _ = pin.set_low();
            }
            self.enabled = false;
            return Err(PowerFault { rail });
        }
        self.enabled = true;
        self.delay.delay_us(settle_us(self.settle));
        Ok(())
    }

    /// Drives every rail low. All rails are attempted even if one fails.
    pub fn disable(&mut self) -> Result<(), PowerFault> {
        let mut fault = None;
        for (rail, pin) in self.rails.iter_mut().enumerate() {
            if pin.set_low().is_err() && fault.is_none() {
                fault = Some(PowerFault { rail });
            }
        }
        self.enabled = false;
        fault.map_or(Ok(()), Err)
    }

    /// Powers the peripherals for a window unless they are already up.
    pub fn begin_window(&mut self) -> Result<(), PowerFault> {
        if self.enabled {
            return Ok(());
        }
        self.enable()
    }

    /// Cuts power after a window when the policy gates per window.
    pub fn end_window(&mut self) -> Result<(), PowerFault> {
        match self.policy {
            PowerPolicy::AlwaysOn => Ok(()),
            PowerPolicy::ActiveWindowOnly => self.disable(),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn policy(&self) -> PowerPolicy {
        self.policy
    }

    pub fn release(self) -> ([P; N], D) {
        (self.rails, self.delay)
    }
}

fn settle_us(settle: Duration) -> u32 {
    u32::try_from(settle.as_micros()).unwrap_or(u32::MAX)
}
