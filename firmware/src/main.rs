#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(not(target_os = "none"), allow(dead_code))]

#[cfg(all(feature = "pulse-sensor", feature = "serial-sensor"))]
compile_error!("enable exactly one of `pulse-sensor` or `serial-sensor`");

#[cfg(not(any(feature = "pulse-sensor", feature = "serial-sensor")))]
compile_error!("enable one of `pulse-sensor` or `serial-sensor`");

#[cfg(all(target_os = "none", not(feature = "defmt-panic")))]
extern crate panic_halt;

#[cfg(all(target_os = "none", feature = "defmt-panic"))]
mod panic;

mod deployment;
mod telemetry;

#[cfg(target_os = "none")]
mod hw;
#[cfg(target_os = "none")]
mod runtime;

#[cfg(not(target_os = "none"))]
fn main() {}
