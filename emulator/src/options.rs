use std::path::PathBuf;
use std::time::Duration;

use node_core::filter::FilterSeed;
use node_core::{ConfigError, NodeConfig, TransmitTrigger};

pub const USAGE: &str = "Usage: tank-emulator [--strategy <serial|pulse>] [--alpha <0..1>] \
[--rounds <n>] [--repeat <n>] [--measurements <n>] [--windows <n>] [--level <cm>] \
[--noise <cm>] [--fault-every <n>] [--seed <zero|first>] [--heartbeat <windows>] \
[--tick-ms <ms>] [--transcript <path>]";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    Serial,
    Pulse,
}

impl Strategy {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("serial") {
            Ok(Self::Serial)
        } else if tag.eq_ignore_ascii_case("pulse") {
            Ok(Self::Pulse)
        } else {
            Err(format!("Unknown sensor strategy `{tag}`"))
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Strategy::Serial => "framed-serial",
            Strategy::Pulse => "pulse-timing",
        }
    }
}

/// Command-line overrides on top of the strategy's deployment preset.
#[derive(Clone, Debug, PartialEq)]
pub struct EmulatorOptions {
    pub strategy: Strategy,
    pub alpha: Option<f32>,
    pub rounds: Option<u32>,
    pub repeat: Option<u16>,
    pub measurements: Option<u8>,
    pub windows: usize,
    pub level_cm: u32,
    pub noise_cm: u32,
    pub fault_every: Option<u32>,
    pub seed: Option<FilterSeed>,
    /// Send only on change, plus a heartbeat every this many windows.
    pub heartbeat: Option<u16>,
    pub tick: Duration,
    pub transcript: PathBuf,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Serial,
            alpha: None,
            rounds: None,
            repeat: None,
            measurements: None,
            windows: 5,
            level_cm: 120,
            noise_cm: 0,
            fault_every: None,
            seed: None,
            heartbeat: None,
            tick: Duration::from_millis(20),
            transcript: PathBuf::from("target/emulator/transcript.log"),
        }
    }
}

impl EmulatorOptions {
    /// Parses `--flag value` and `--flag=value` pairs.
    pub fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            let value = match inline {
                Some(value) => value,
                None => args
                    .next()
                    .ok_or_else(|| format!("Expected value after {flag}"))?,
            };

            match flag.as_str() {
                "--strategy" => options.strategy = Strategy::from_tag(&value)?,
                "--alpha" => options.alpha = Some(number(&flag, &value)?),
                "--rounds" => options.rounds = Some(number(&flag, &value)?),
                "--repeat" => options.repeat = Some(number(&flag, &value)?),
                "--measurements" => options.measurements = Some(number(&flag, &value)?),
                "--windows" => options.windows = number(&flag, &value)?,
                "--level" => options.level_cm = number(&flag, &value)?,
                "--noise" => options.noise_cm = number(&flag, &value)?,
                "--fault-every" => options.fault_every = Some(number(&flag, &value)?),
                "--seed" => options.seed = Some(seed_from_tag(&value)?),
                "--heartbeat" => options.heartbeat = Some(number(&flag, &value)?),
                "--tick-ms" => options.tick = Duration::from_millis(number(&flag, &value)?),
                "--transcript" => options.transcript = PathBuf::from(value),
                other => return Err(format!("Unknown option `{other}`")),
            }
        }

        Ok(options)
    }

    /// Applies the overrides to the strategy preset and validates the result.
    pub fn node_config(&self) -> Result<NodeConfig, ConfigError> {
        let mut config = match self.strategy {
            Strategy::Serial => NodeConfig::serial_sensor_preset(),
            Strategy::Pulse => NodeConfig::pulse_sensor_preset(),
        };
        if let Some(alpha) = self.alpha {
            config = config.with_smoothing(alpha);
        }
        if let Some(rounds) = self.rounds {
            config = config.with_sleep_rounds(rounds);
        }
        if let Some(repeat) = self.repeat {
            config = config.with_repetitions(repeat);
        }
        if let Some(measurements) = self.measurements {
            config = config.with_measurements(measurements);
        }
        if let Some(seed) = self.seed {
            config = config.with_filter_seed(seed);
        }
        if let Some(heartbeat_windows) = self.heartbeat {
            config = config.with_transmit_trigger(TransmitTrigger::OnChange { heartbeat_windows });
        }
        config.validate()?;
        Ok(config)
    }
}

fn seed_from_tag(tag: &str) -> Result<FilterSeed, String> {
    if tag.eq_ignore_ascii_case("zero") {
        Ok(FilterSeed::Zero)
    } else if tag.eq_ignore_ascii_case("first") {
        Ok(FilterSeed::FirstSample)
    } else {
        Err(format!("Unknown filter seed `{tag}`"))
    }
}

fn number<T>(flag: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
{
    value
        .parse()
        .map_err(|_| format!("Invalid value `{value}` for {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<EmulatorOptions, String> {
        EmulatorOptions::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn defaults_to_serial_preset() {
        let options = parse(&[]).unwrap();
        assert_eq!(options.strategy, Strategy::Serial);
        assert_eq!(
            options.node_config(),
            Ok(NodeConfig::serial_sensor_preset())
        );
    }

    #[test]
    fn accepts_separate_and_inline_values() {
        let options = parse(&[
            "--strategy",
            "pulse",
            "--alpha=0.25",
            "--rounds",
            "3",
            "--repeat=2",
            "--level",
            "80",
        ])
        .unwrap();

        assert_eq!(options.strategy, Strategy::Pulse);
        assert_eq!(options.level_cm, 80);
        let config = options.node_config().unwrap();
        assert!((config.alpha - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.max_sleep_rounds, 3);
        assert_eq!(config.transmit.attempts, 2);
        assert_eq!(config.tank_height, 190);
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        assert!(parse(&["--volume", "3"]).is_err());
        assert!(parse(&["--rounds", "many"]).is_err());
        assert!(parse(&["--strategy", "laser"]).is_err());
        assert!(parse(&["--windows"]).is_err());
        assert!(parse(&["--seed", "last"]).is_err());
    }

    #[test]
    fn seed_and_heartbeat_reach_the_config() {
        let options = parse(&["--strategy=pulse", "--seed", "first", "--heartbeat=6"]).unwrap();
        let config = options.node_config().unwrap();

        assert_eq!(config.filter_seed, FilterSeed::FirstSample);
        assert_eq!(
            config.transmit_trigger,
            TransmitTrigger::OnChange { heartbeat_windows: 6 }
        );
    }

    #[test]
    fn invalid_overrides_fail_validation() {
        let options = parse(&["--alpha", "1.5"]).unwrap();
        assert_eq!(options.node_config(), Err(ConfigError::AlphaOutOfRange));

        let options = parse(&["--rounds", "0"]).unwrap();
        assert_eq!(options.node_config(), Err(ConfigError::ZeroSleepRounds));

        let options = parse(&["--heartbeat", "0"]).unwrap();
        assert_eq!(options.node_config(), Err(ConfigError::ZeroHeartbeat));
    }
}
