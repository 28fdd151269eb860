mod options;
mod session;
mod sim;

use std::env;
use std::io;
use std::process;

use options::{EmulatorOptions, USAGE};
use session::Session;

fn main() -> io::Result<()> {
    let options = EmulatorOptions::parse(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });
    let config = options.node_config().unwrap_or_else(|err| {
        eprintln!("Invalid node configuration: {err}");
        process::exit(2);
    });

    println!(
        "Tank telemetry emulator: {} sensor, {} windows, transcript at {}",
        options.strategy.label(),
        options.windows,
        options.transcript.display()
    );

    let summary = Session::new(options, config)?.run()?;
    println!(
        "Sent {} frames over {} windows ({} suppressed, {} rejected by the base station).",
        summary.frames_received,
        summary.windows,
        summary.suppressed_windows,
        summary.frames_rejected
    );
    Ok(())
}
