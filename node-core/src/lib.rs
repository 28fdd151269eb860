#![cfg_attr(not(test), no_std)]

// Shared logic for the tank telemetry node.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and expressing every hardware dependency through
// `embedded-hal` / `embedded-io` traits or the small traits defined here.

pub mod config;
pub mod filter;
pub mod node;
pub mod power;
pub mod retry;
pub mod scheduler;
pub mod sensor;
pub mod telemetry;

pub use config::{ConfigError, NodeConfig, SentinelPolicy, TransmitTrigger};
pub use node::{TelemetryNode, WindowReport};
pub use scheduler::{DutyCycleScheduler, SchedulerState, WakeSource};
pub use sensor::{DistanceSensor, RawSample, SampleStatus};
