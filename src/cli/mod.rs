pub(crate) mod calibrate;
pub(crate) mod command;
pub(crate) mod exchange;
pub(crate) mod measure;
pub(crate) mod report;
pub(crate) mod settings;
pub(crate) mod ui;

use std::io;

use anyhow::{Result, bail};
use tracing::instrument;

use crate::terminal::TerminalClient;
use crate::transport::Transport;

use self::exchange::Exchange;
use self::report::RunReport;
use self::ui::{Painter, ReportView, Spinner};

pub use self::calibrate::CalibrateArgs;
pub use self::command::{Args, Command, FakeArgs, InstrumentTarget, LogLevel, OutputFormat};
pub use self::measure::MeasureArgs;
pub use self::settings::SettingsArgs;

/// Runs one command against a freshly opened session, then writes the report.
///
/// Instrument-reported errors are written out before being returned as a
/// failure.
#[instrument(
    skip_all,
    level = "info",
    fields(command = command.name(), ?output_format)
)]
pub(crate) async fn execute<W>(
    command: Command,
    target: InstrumentTarget,
    transport: Box<dyn Transport>,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let target = match &command {
        Command::Settings(args) => target.map_settings(|settings| args.apply(settings)),
        Command::Identify | Command::Measure(_) | Command::Calibrate(_) => target,
    };
    let spinner =
        Spinner::new(output_format == OutputFormat::Pretty && terminal_client.stderr_is_terminal());

    let mut exchange = Exchange::open(target, transport, spinner).await?;
    let outcome = match &command {
        Command::Identify | Command::Settings(_) => Ok(()),
        Command::Measure(args) => measure::run(&mut exchange, args).await,
        Command::Calibrate(args) => calibrate::run(&mut exchange, args).await,
    };
    let include_settings = matches!(command, Command::Identify | Command::Settings(_));
    let report = exchange.finish(command.name(), include_settings).await;
    outcome?;

    write_report(&report, out, terminal_client, output_format)?;
    let errors = report.error_count();
    if errors > 0 {
        bail!("instrument reported {errors} error(s)");
    }
    Ok(())
}

fn write_report<W>(
    report: &RunReport,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ReportView::new(report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
