use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use spectro::{Args, OutputFormat, fake_transport, run_with_log_level, serial_transport};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let (command, target, maybe_fake_args) = args.into_command_and_target()?;
        let transport = match maybe_fake_args {
            Some(fake_args) => fake_transport(target.driver(), &fake_args),
            None => serial_transport(),
        };

        run_with_log_level(
            command,
            target,
            &mut stdout,
            transport,
            output_format,
            log_level,
        )
        .await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
