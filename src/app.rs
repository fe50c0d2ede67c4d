use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, FakeArgs, InstrumentTarget, LogLevel, OutputFormat};
use crate::drivers::DriverModel;
use crate::telemetry::{self, TelemetryOptions};
use crate::terminal::{SystemTerminalClient, TerminalClient};
use crate::transport::{SerialTransport, Transport};

/// Creates a transport backed by a real serial port.
#[must_use]
pub fn serial_transport() -> Box<dyn Transport> {
    Box::new(SerialTransport::new())
}

/// Creates a transport backed by a simulated instrument of `model`.
///
/// ```
/// use spectro::Transport as _;
///
/// let fake = spectro::FakeArgs::builder().serial_number("SN42").build();
/// let transport = spectro::fake_transport(spectro::DriverModel::Sp62, &fake);
/// assert!(!transport.is_open());
/// ```
#[must_use]
pub fn fake_transport(model: DriverModel, fake_args: &FakeArgs) -> Box<dyn Transport> {
    let instrument = model.simulator(fake_args.serial_number());
    instrument.go_silent_for(fake_args.silent_requests());
    instrument.set_powered(!fake_args.powered_off());
    Box::new(instrument.transport())
}

/// Runs the CLI command against `transport`.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = spectro::Args::try_parse_from(["spectro", "--fake", "identify"])?;
/// let (command, target, maybe_fake_args) = args.into_command_and_target()?;
/// let transport = match maybe_fake_args {
///     Some(fake_args) => spectro::fake_transport(target.driver(), &fake_args),
///     None => spectro::serial_transport(),
/// };
/// let mut out = Vec::new();
/// spectro::run(command, target, &mut out, transport, spectro::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the instrument cannot be
/// reached or reports an error, or output writing fails.
pub async fn run<W>(
    command: Command,
    target: InstrumentTarget,
    out: &mut W,
    transport: Box<dyn Transport>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, target, out, transport, output_format, None).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the instrument cannot be
/// reached or reports an error, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    target: InstrumentTarget,
    out: &mut W,
    transport: Box<dyn Transport>,
    output_format: OutputFormat,
    log_level: Option<LogLevel>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        target,
        out,
        &SystemTerminalClient,
        transport,
        output_format,
        log_level,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl spectro::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = spectro::Args::try_parse_from([
///     "spectro",
///     "--fake",
///     "--driver",
///     "cm2002",
///     "measure",
///     "--count",
///     "2",
/// ])?;
/// let log_level = args.log_level();
/// let (command, target, maybe_fake_args) = args.into_command_and_target()?;
/// let fake_args = maybe_fake_args.unwrap_or_else(|| spectro::FakeArgs::builder().build());
/// let transport = spectro::fake_transport(target.driver(), &fake_args);
/// let mut out = Vec::new();
/// spectro::run_with_clients(
///     command,
///     target,
///     &mut out,
///     &FakeTerminal,
///     transport,
///     spectro::OutputFormat::Pretty,
///     log_level,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the instrument cannot be
/// reached or reports an error, or output writing fails.
#[instrument(
    skip(command, target, out, terminal_client, transport),
    level = "info",
    fields(command = command.name(), model = %target.driver())
)]
pub async fn run_with_clients<W>(
    command: Command,
    target: InstrumentTarget,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    transport: Box<dyn Transport>,
    output_format: OutputFormat,
    log_level: Option<LogLevel>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        &TelemetryOptions::builder()
            .service_name("spectro")
            .interactive_terminal(terminal_client.stderr_is_terminal())
            .maybe_log_level(log_level)
            .build(),
    )?;

    crate::cli::execute(
        command,
        target,
        transport,
        out,
        terminal_client,
        output_format,
    )
    .await
}
