use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant as HostInstant};

use node_core::config::SensorTiming;
use node_core::sensor::{DistanceSensor, FramedSerialSensor, TimedPulseSensor};
use node_core::telemetry::TelemetryFrame;
use node_core::{DutyCycleScheduler, NodeConfig, TelemetryNode, WakeSource, WindowReport};

use crate::options::{EmulatorOptions, Strategy};
use crate::sim::{PulseModule, Radio, Rail, SerialModule, SimClock, SimDelay, Tank};

/// Totals over a whole session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionSummary {
    pub windows: usize,
    pub invalid_windows: usize,
    pub suppressed_windows: usize,
    /// Windows skipped because the distance had not changed.
    pub held_windows: usize,
    pub frames_received: usize,
    pub frames_rejected: usize,
    pub wake_ticks: u32,
}

/// One emulated node wired to simulated peripherals.
pub struct Session {
    options: EmulatorOptions,
    config: NodeConfig,
    transcript: TranscriptLogger,
    started_at: HostInstant,
}

type RailEvents = Rc<RefCell<Vec<(&'static str, bool)>>>;

impl Session {
    pub fn new(options: EmulatorOptions, config: NodeConfig) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(&options.transcript, &options, &config)?;
        Ok(Self {
            options,
            config,
            transcript,
            started_at: HostInstant::now(),
        })
    }

    /// Runs the configured number of windows and returns the totals.
    pub fn run(&mut self) -> io::Result<SessionSummary> {
        let clock = SimClock::default();
        let tank = Rc::new(RefCell::new(Tank::new(
            self.options.level_cm,
            self.options.noise_cm,
            self.options.fault_every,
        )));

        match self.options.strategy {
            Strategy::Pulse => {
                let module = PulseModule::new(&clock, &tank);
                let sensor = TimedPulseSensor::new(
                    module.trigger(),
                    module.echo(),
                    SimDelay(clock.clone()),
                    clock.clone(),
                    self.config.sensor.echo,
                    self.config.tank_height,
                );
                self.run_with(sensor, &clock)
            }
            Strategy::Serial => {
                let timing: SensorTiming = self.config.sensor;
                let sensor = FramedSerialSensor::new(
                    SerialModule::new(&tank),
                    SimDelay(clock.clone()),
                    &timing,
                    self.config.tank_height,
                );
                self.run_with(sensor, &clock)
            }
        }
    }

    fn run_with<S>(&mut self, sensor: S, clock: &SimClock) -> io::Result<SessionSummary>
    where
        S: DistanceSensor,
    {
        let radio = Radio::default();
        let events: RailEvents = Rc::default();
        let mut node = TelemetryNode::from_config(
            self.config,
            sensor,
            [Rail::new("radio", &events), Rail::new("sensor", &events)],
            SimDelay(clock.clone()),
            radio.clone(),
            SimDelay(clock.clone()),
        )
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;

        if let Err(fault) = node.start() {
            self.log(TranscriptRole::Power, &fault.to_string())?;
        }
        self.log_rail_events(&events)?;

        let scheduler = Arc::new(DutyCycleScheduler::new(self.config.max_sleep_rounds));
        let ticker = Ticker::spawn(Arc::clone(&scheduler), self.options.tick);
        let mut wake = ParkWake::new(self.options.tick);
        let mut summary = SessionSummary::default();

        for _ in 0..self.options.windows {
            let wakes_before = wake.wakeups;
            let sim_before = clock.now_us();
            let report = node.serve_window(&scheduler, &mut wake);
            self.log_window(
                scheduler.windows_entered(),
                wake.wakeups - wakes_before,
                clock.now_us() - sim_before,
                &report,
            )?;
            self.log_rail_events(&events)?;
            self.log_radio(&radio, &mut summary)?;

            summary.windows += 1;
            if report.valid_samples == 0 {
                summary.invalid_windows += 1;
            }
            if report.unchanged {
                summary.held_windows += 1;
            } else if !report.transmitted() {
                summary.suppressed_windows += 1;
            }
        }

        summary.wake_ticks = ticker.stop();
        self.log(
            TranscriptRole::Node,
            &format!(
                "session done: windows={} invalid={} suppressed={} held={} frames={} rejected={} ticks={}",
                summary.windows,
                summary.invalid_windows,
                summary.suppressed_windows,
                summary.held_windows,
                summary.frames_received,
                summary.frames_rejected,
                summary.wake_ticks
            ),
        )?;
        Ok(summary)
    }

    fn log_window(
        &mut self,
        window: u32,
        wakeups: u32,
        simulated_us: u64,
        report: &WindowReport,
    ) -> io::Result<()> {
        let smoothed = report
            .smoothed
            .map_or_else(|| "-".to_string(), |value| format!("{value:.2}"));
        let outcome = match report.transmit {
            Some(transmit) => format!(
                "sent {}x (failed {})",
                transmit.attempted, transmit.failed
            ),
            None if report.unchanged => "held (unchanged)".to_string(),
            None => "suppressed".to_string(),
        };
        let line = format!(
            "window #{window} wakeups={wakeups} samples={}/{} status={} smoothed={smoothed} \
             distance={}cm {outcome} busy={}ms",
            report.valid_samples,
            report.samples,
            report.last_status,
            report.distance,
            simulated_us / 1_000,
        );
        self.log(TranscriptRole::Node, &line)
    }

    fn log_rail_events(&mut self, events: &RailEvents) -> io::Result<()> {
        let drained: Vec<_> = events.borrow_mut().drain(..).collect();
        for (rail, high) in drained {
            let state = if high { "on" } else { "off" };
            self.log(TranscriptRole::Power, &format!("{rail} rail {state}"))?;
        }
        Ok(())
    }

    fn log_radio(&mut self, radio: &Radio, summary: &mut SessionSummary) -> io::Result<()> {
        for line in radio.take_lines() {
            self.log(TranscriptRole::Radio, &line)?;
            summary.frames_received += 1;
            let decoded = match TelemetryFrame::parse_verified(&line) {
                Ok(frame) => format!(
                    "sensor={} distance={}cm checksum ok",
                    frame.sensor_id, frame.distance
                ),
                Err(error) => {
                    summary.frames_rejected += 1;
                    format!("rejected: {error}")
                }
            };
            self.log(TranscriptRole::Base, &decoded)?;
        }
        Ok(())
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        let elapsed = self.started_at.elapsed();
        println!("{} {line}", role.prefix());
        self.transcript.append_line(elapsed, role, line)
    }
}

/// Stand-in for the periodic timer interrupt, running on its own thread.
struct Ticker {
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU32>,
    handle: thread::JoinHandle<()>,
}

impl Ticker {
    fn spawn(scheduler: Arc<DutyCycleScheduler>, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU32::new(0));
        let main = thread::current();
        let handle = {
            let stop = Arc::clone(&stop);
            let ticks = Arc::clone(&ticks);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(period);
                    scheduler.on_wake_interrupt();
                    ticks.fetch_add(1, Ordering::Relaxed);
                    main.unpark();
                }
            })
        };
        Self {
            stop,
            ticks,
            handle,
        }
    }

    /// Stops the thread and returns the number of ticks it delivered.
    fn stop(self) -> u32 {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            eprintln!("ticker thread panicked");
        }
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Host sleep primitive: park until the ticker unparks this thread.
struct ParkWake {
    timeout: Duration,
    wakeups: u32,
}

impl ParkWake {
    fn new(tick: Duration) -> Self {
        Self {
            timeout: tick * 4,
            wakeups: 0,
        }
    }
}

impl WakeSource for ParkWake {
    fn sleep_until_interrupt<F>(&mut self, pending: F)
    where
        F: Fn() -> bool,
    {
        // An unpark issued before this call is remembered by the park token,
        // so checking first and parking second cannot lose a tick.
        if pending() {
            return;
        }
        thread::park_timeout(self.timeout);
        self.wakeups += 1;
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, options: &EmulatorOptions, config: &NodeConfig) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(options, config)?;
        Ok(logger)
    }

    fn write_header(&mut self, options: &EmulatorOptions, config: &NodeConfig) -> io::Result<()> {
        writeln!(
            self.writer,
            "# Tank telemetry emulator transcript ({})",
            options.strategy.label()
        )?;
        writeln!(
            self.writer,
            "# sensor_id={} tank_height={}cm level={}cm noise={}cm rounds={} repeat={} \
             smoothing={:?} alpha={}",
            config.sensor_id,
            config.tank_height,
            options.level_cm,
            options.noise_cm,
            config.max_sleep_rounds,
            config.transmit.attempts,
            config.smoothing,
            config.alpha
        )?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Node,
    Power,
    Radio,
    Base,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Node => "NODE >",
            TranscriptRole::Power => "POWER>",
            TranscriptRole::Radio => "RF   >",
            TranscriptRole::Base => "BASE <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(strategy: Strategy, name: &str) -> EmulatorOptions {
        EmulatorOptions {
            strategy,
            windows: 3,
            tick: Duration::from_millis(1),
            transcript: std::env::temp_dir()
                .join(format!("tank-emulator-{}-{name}.log", std::process::id())),
            ..EmulatorOptions::default()
        }
    }

    fn run(options: EmulatorOptions) -> (SessionSummary, String) {
        let config = options.node_config().unwrap();
        let path = options.transcript.clone();
        let summary = Session::new(options, config).unwrap().run().unwrap();
        let transcript = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(path);
        (summary, transcript)
    }

    #[test]
    fn serial_session_repeats_every_frame() {
        let (summary, transcript) = run(options(Strategy::Serial, "serial"));

        assert_eq!(summary.windows, 3);
        assert_eq!(summary.invalid_windows, 0);
        assert_eq!(summary.frames_received, 30);
        assert_eq!(summary.frames_rejected, 0);
        assert!(summary.wake_ticks >= 27);
        assert!(transcript.contains("RF   > 1,120,121"));
        assert!(transcript.contains("POWER> radio rail on"));
        assert!(transcript.contains("POWER> sensor rail off"));
    }

    #[test]
    fn pulse_session_smooths_readings() {
        let mut options = options(Strategy::Pulse, "pulse");
        options.level_cm = 100;
        let (summary, transcript) = run(options);

        assert_eq!(summary.frames_received, 3);
        assert!(transcript.contains("RF   > 1,10,11"));
        assert!(transcript.contains("RF   > 1,19,20"));
        assert!(transcript.contains("RF   > 1,27,28"));
    }

    #[test]
    fn faulty_readings_go_out_as_sentinel() {
        let mut options = options(Strategy::Serial, "faults");
        options.fault_every = Some(2);
        options.windows = 4;
        let (summary, transcript) = run(options);

        assert_eq!(summary.invalid_windows, 2);
        assert_eq!(summary.suppressed_windows, 0);
        assert_eq!(summary.frames_received, 40);
        assert!(transcript.contains("status=checksum-mismatch"));
        assert!(transcript.contains("RF   > 1,200,201"));
    }

    #[test]
    fn steady_level_is_held_back_until_heartbeat() {
        let mut options = options(Strategy::Serial, "heartbeat");
        options.heartbeat = Some(5);
        let (summary, transcript) = run(options);

        assert_eq!(summary.windows, 3);
        assert_eq!(summary.held_windows, 2);
        assert_eq!(summary.suppressed_windows, 0);
        assert_eq!(summary.frames_received, 10);
        assert!(transcript.contains("held (unchanged)"));
    }
}
