use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[allow(dead_code)]
#[path = "../options.rs"]
mod options;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../sim.rs"]
mod sim;

use options::{EmulatorOptions, Strategy};
use session::Session;

fn main() -> io::Result<()> {
    record(
        "serial",
        EmulatorOptions {
            strategy: Strategy::Serial,
            fault_every: Some(4),
            ..EmulatorOptions::default()
        },
    )?;
    record(
        "pulse",
        EmulatorOptions {
            strategy: Strategy::Pulse,
            windows: 8,
            noise_cm: 2,
            ..EmulatorOptions::default()
        },
    )?;
    Ok(())
}

fn record(name: &str, options: EmulatorOptions) -> io::Result<()> {
    let options = EmulatorOptions {
        tick: Duration::from_millis(5),
        transcript: PathBuf::from(format!("target/emulator/{name}.log")),
        ..options
    };
    let config = options
        .node_config()
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;
    Session::new(options, config)?.run()?;
    Ok(())
}
