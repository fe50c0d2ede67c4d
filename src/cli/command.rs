use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::calibrate::CalibrateArgs;
use crate::cli::measure::MeasureArgs;
use crate::cli::settings::SettingsArgs;
use crate::drivers::DriverModel;
use crate::error::CliConfigError;
use crate::settings::{ConnectionConfig, FlowControl, InstrumentSettings};

const FAKE_PORT: &str = "fake";
const DEFAULT_FAKE_SERIAL: &str = "FAKE0001";

/// Command-line options for the spectrophotometer tool.
#[derive(Debug, Parser)]
#[command(name = "spectro", about = "Drive serial spectrophotometers.")]
pub struct Args {
    /// Log verbosity. Overrides `RUST_LOG` when given.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Instrument family to talk to.
    #[arg(long, global = true, value_enum, default_value = "ce7000")]
    driver: DriverModel,
    /// Settings file. Defaults to `settings.toml` in the platform config directory.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Serial port, e.g. `/dev/ttyUSB0` or `COM3`. Overrides the settings file.
    #[arg(long, global = true)]
    port: Option<String>,
    #[arg(long, global = true)]
    baud_rate: Option<u32>,
    /// `none`, `rts-cts` or `xon-xoff`.
    #[arg(long, global = true)]
    flow_control: Option<FlowControl>,
    /// Response window (e.g. `500ms`, `15s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    response_timeout: Option<Duration>,
    /// Talks to a simulated instrument instead of a serial port.
    #[arg(long, global = true)]
    fake: bool,
    /// Serial number reported by the simulated instrument.
    #[arg(long, global = true, requires = "fake")]
    fake_serial: Option<String>,
    /// Number of requests the simulated instrument ignores before answering.
    #[arg(long, global = true, requires = "fake")]
    fake_silent: Option<usize>,
    /// Simulates an instrument that is switched off, so opening fails.
    #[arg(long, global = true, requires = "fake")]
    fake_powered_off: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed arguments into the command, the resolved instrument
    /// target and optional fake-instrument settings.
    ///
    /// Connection parameters given on the command line override the settings
    /// file.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded or no serial
    /// port is configured.
    pub fn into_command_and_target(
        self,
    ) -> anyhow::Result<(Command, InstrumentTarget, Option<FakeArgs>)> {
        let Args {
            driver,
            settings,
            port,
            baud_rate,
            flow_control,
            response_timeout,
            fake,
            fake_serial,
            fake_silent,
            fake_powered_off,
            command,
            ..
        } = self;

        let settings_path = match settings {
            Some(path) => Some(path),
            None => InstrumentSettings::default_path()
                .ok()
                .filter(|path| path.is_file()),
        };
        let base = settings_path
            .as_deref()
            .map(InstrumentSettings::load)
            .transpose()?;
        let base_connection = base.as_ref().map(InstrumentSettings::connection);

        let port = port
            .or_else(|| base_connection.map(|connection| connection.port().to_owned()))
            .or_else(|| fake.then(|| FAKE_PORT.to_owned()));
        let Some(port) = port else {
            let path = InstrumentSettings::default_path()
                .unwrap_or_else(|_error| PathBuf::from("settings.toml"));
            return Err(CliConfigError::MissingConnection { path }.into());
        };
        let connection = ConnectionConfig::builder()
            .port(port)
            .maybe_baud_rate(baud_rate.or(base_connection.map(ConnectionConfig::baud_rate)))
            .maybe_flow_control(
                flow_control.or(base_connection.map(ConnectionConfig::flow_control)),
            )
            .maybe_response_timeout(
                response_timeout.or(base_connection.and_then(ConnectionConfig::response_timeout)),
            )
            .build();

        let settings = match base {
            Some(base) => base.with_connection(connection),
            None => InstrumentSettings::builder().connection(connection).build(),
        };
        let target = InstrumentTarget::builder()
            .driver(driver)
            .settings(settings)
            .build();

        let fake_args = fake.then(|| {
            FakeArgs::builder()
                .maybe_serial_number(fake_serial)
                .maybe_silent_requests(fake_silent)
                .powered_off(fake_powered_off)
                .build()
        });

        Ok((command, target, fake_args))
    }
}

/// The instrument a command runs against.
#[derive(Debug, Clone, Builder)]
pub struct InstrumentTarget {
    driver: DriverModel,
    settings: InstrumentSettings,
}

impl InstrumentTarget {
    #[must_use]
    pub fn driver(&self) -> DriverModel {
        self.driver
    }

    #[must_use]
    pub fn settings(&self) -> &InstrumentSettings {
        &self.settings
    }

    pub(crate) fn map_settings(
        self,
        update: impl FnOnce(InstrumentSettings) -> InstrumentSettings,
    ) -> Self {
        Self {
            settings: update(self.settings),
            ..self
        }
    }

    pub(crate) fn into_settings(self) -> InstrumentSettings {
        self.settings
    }
}

/// Simulated-instrument options for programmatic and `--fake` runs.
#[derive(Debug, Clone, Builder)]
pub struct FakeArgs {
    #[builder(into, default = DEFAULT_FAKE_SERIAL.to_owned())]
    serial_number: String,
    #[builder(default)]
    silent_requests: usize,
    #[builder(default)]
    powered_off: bool,
}

impl FakeArgs {
    #[must_use]
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    #[must_use]
    pub fn silent_requests(&self) -> usize {
        self.silent_requests
    }

    #[must_use]
    pub fn powered_off(&self) -> bool {
        self.powered_off
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect, apply the configured settings and report the serial number.
    Identify,
    /// Take one or more measurements, or read back a stored sample.
    Measure(MeasureArgs),
    /// Run one calibration step.
    Calibrate(CalibrateArgs),
    /// Apply settings and print the configuration the instrument confirmed.
    Settings(SettingsArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Identify => "identify",
            Self::Measure(_args) => "measure",
            Self::Calibrate(_args) => "calibrate",
            Self::Settings(_args) => "settings",
        }
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::settings::SpecularMode;

    #[test]
    fn fake_flags_require_fake_mode() {
        let result = Args::try_parse_from(["spectro", "--fake-silent", "2", "identify"]);

        let error = result.expect_err("--fake-silent should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_mode_needs_no_port() {
        let args = Args::try_parse_from([
            "spectro",
            "--fake",
            "--fake-serial",
            "SN42",
            "--driver",
            "sp62",
            "identify",
        ])
        .expect("valid fake arguments should parse");

        let (command, target, fake) = args
            .into_command_and_target()
            .expect("fake arguments should resolve a target");

        assert_matches!(command, Command::Identify);
        assert_eq!(DriverModel::Sp62, target.driver());
        assert_eq!("fake", target.settings().connection().port());
        let fake = fake.expect("fake mode should produce fake arguments");
        assert_eq!("SN42", fake.serial_number());
        assert_eq!(0, fake.silent_requests());
        assert!(!fake.powered_off());
    }

    #[test]
    fn command_line_connection_overrides_the_settings_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        write!(
            file,
            "specular = \"excluded\"\n\n[connection]\nport = \"/dev/ttyS0\"\nbaud_rate = 4800\n"
        )
        .expect("settings should be written");
        let path = file.path().to_str().expect("temp path should be UTF-8");

        let args = Args::try_parse_from([
            "spectro",
            "--settings",
            path,
            "--port",
            "/dev/ttyUSB1",
            "--response-timeout",
            "2s",
            "identify",
        ])
        .expect("arguments should parse");
        let (_command, target, fake) = args
            .into_command_and_target()
            .expect("settings file should load");

        let connection = target.settings().connection();
        assert_eq!("/dev/ttyUSB1", connection.port());
        assert_eq!(4800, connection.baud_rate());
        assert_eq!(Some(Duration::from_secs(2)), connection.response_timeout());
        assert_eq!(SpecularMode::Excluded, target.settings().specular());
        assert!(fake.is_none());
    }

    #[test]
    fn flow_control_is_parsed_from_kebab_case() {
        let args = Args::try_parse_from([
            "spectro",
            "--fake",
            "--flow-control",
            "rts-cts",
            "identify",
        ])
        .expect("arguments should parse");

        let (_command, target, _fake) = args
            .into_command_and_target()
            .expect("fake arguments should resolve a target");

        assert_eq!(FlowControl::RtsCts, target.settings().connection().flow_control());
    }

    #[test]
    fn log_levels_map_onto_filters() {
        assert_eq!(LevelFilter::TRACE, LogLevel::Trace.as_level_filter());
        assert_eq!(LevelFilter::WARN, LogLevel::Warn.as_level_filter());
    }
}
