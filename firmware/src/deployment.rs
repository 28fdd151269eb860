//! Build-time deployment selection.
//!
//! The acquisition strategy is fixed by Cargo feature; everything else about
//! the node comes from the matching [`NodeConfig`] preset.

use node_core::NodeConfig;

/// Period of the wake tick feeding the duty-cycle scheduler.
pub const WAKE_PERIOD_MS: u64 = 1_000;

/// Baud rate of both the radio and the framed sensor link.
pub const LINK_BAUD: u32 = 9_600;

/// UART ring sizes; a frame is at most 16 bytes and ten are queued per window.
pub const RADIO_TX_BUFFER: usize = 256;
pub const LINK_RX_BUFFER: usize = 64;

#[cfg(feature = "serial-sensor")]
pub const NODE_CONFIG: NodeConfig = NodeConfig::serial_sensor_preset();

#[cfg(all(feature = "pulse-sensor", not(feature = "serial-sensor")))]
pub const NODE_CONFIG: NodeConfig = NodeConfig::pulse_sensor_preset();

#[cfg(feature = "serial-sensor")]
pub const STRATEGY: &str = "framed-serial";

#[cfg(all(feature = "pulse-sensor", not(feature = "serial-sensor")))]
pub const STRATEGY: &str = "pulse-timing";

/// Time between two telemetry windows.
pub fn telemetry_interval_ms(config: &NodeConfig) -> u64 {
    WAKE_PERIOD_MS * u64::from(config.max_sleep_rounds)
}
