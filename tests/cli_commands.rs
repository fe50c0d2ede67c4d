use clap::Parser;
use clap::error::ErrorKind;
use pretty_assertions::assert_eq;
use serde_json::Value;

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl spectro::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

/// Runs `argv` against the simulated instrument and returns the command
/// result along with everything written to stdout.
async fn run_with_argv<const N: usize>(
    argv: [&str; N],
    output_format: spectro::OutputFormat,
) -> (anyhow::Result<()>, String) {
    let mut output = Vec::new();
    let result = async {
        let args = spectro::Args::try_parse_from(argv)?;
        let (command, target, maybe_fake_args) = args.into_command_and_target()?;
        let fake_args = maybe_fake_args
            .ok_or_else(|| anyhow::anyhow!("CLI tests must run with --fake"))?;
        let transport = spectro::fake_transport(target.driver(), &fake_args);
        spectro::run_with_clients(
            command,
            target,
            &mut output,
            &FakeTerminalClient,
            transport,
            output_format,
            None,
        )
        .await
    }
    .await;
    let stdout = String::from_utf8(output).expect("stdout should be UTF-8");
    (result, stdout)
}

fn events_named<'a>(report: &'a Value, name: &str) -> Vec<&'a Value> {
    report["events"]
        .as_array()
        .expect("report should list events")
        .iter()
        .filter(|event| event["event"] == name)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn identify_reports_serial_number_and_confirmed_settings() {
    let (result, stdout) = run_with_argv(
        ["spectro", "--fake", "--fake-serial", "CE1234", "identify"],
        spectro::OutputFormat::Json,
    )
    .await;

    result.expect("identify should succeed against the simulator");
    let report: Value = serde_json::from_str(&stdout).expect("output should be JSON");
    assert_eq!("identify", report["command"]);
    assert_eq!("ce7000", report["model"]);
    assert_eq!("fake", report["port"]);
    assert_eq!("CE1234", report["serial_number"]);
    assert_eq!("large", report["settings"]["aperture"]);
    assert_eq!(4, events_named(&report, "settings_changed").len());
}

#[tokio::test(start_paused = true)]
async fn settings_command_applies_overrides() {
    let (result, stdout) = run_with_argv(
        [
            "spectro",
            "--fake",
            "--driver",
            "cm2002",
            "settings",
            "--aperture",
            "small",
            "--light-filter",
            "uv-excluded",
        ],
        spectro::OutputFormat::Json,
    )
    .await;

    result.expect("settings should apply");
    let report: Value = serde_json::from_str(&stdout).expect("output should be JSON");
    assert_eq!("small", report["settings"]["aperture"]);
    assert_eq!("uv-excluded", report["settings"]["light_filter"]);
    assert_eq!("small", report["settings"]["lens_position"]);
}

#[tokio::test(start_paused = true)]
async fn measure_takes_the_requested_number_of_readings() {
    let (result, stdout) = run_with_argv(
        ["spectro", "--fake", "--driver", "cm2002", "measure", "--count", "2"],
        spectro::OutputFormat::Json,
    )
    .await;

    result.expect("measure should succeed");
    let report: Value = serde_json::from_str(&stdout).expect("output should be JSON");
    let measured = events_named(&report, "measured");
    assert_eq!(2, measured.len());
    assert_eq!(Some(31), measured[0]["reading"].as_object().map(|reading| reading.len()));
    assert!(report.get("settings").is_none());
}

#[tokio::test(start_paused = true)]
async fn stored_sample_is_read_back_on_sp62() {
    let (result, stdout) = run_with_argv(
        ["spectro", "--fake", "--driver", "sp62", "measure", "--stored", "3"],
        spectro::OutputFormat::Json,
    )
    .await;

    result.expect("stored sample retrieval should succeed");
    let report: Value = serde_json::from_str(&stdout).expect("output should be JSON");
    let measured = events_named(&report, "measured");
    assert_eq!(1, measured.len());
    assert_eq!("stored sample 3", measured[0]["status"]["messages"][0]);
}

#[tokio::test(start_paused = true)]
async fn pretty_output_renders_each_reading() {
    let (result, stdout) = run_with_argv(
        ["spectro", "--fake", "--driver", "sp62", "measure"],
        spectro::OutputFormat::Pretty,
    )
    .await;

    result.expect("measure should succeed");
    assert!(stdout.starts_with("Instrument:"));
    assert!(stdout.contains("X-Rite SP62"));
    assert!(stdout.contains("FAKE0001"));
    assert!(stdout.contains("Reading 1:"));
    assert!(stdout.contains("│ 400 │"));
}

#[tokio::test(start_paused = true)]
async fn unsupported_calibration_step_fails() {
    let (result, stdout) = run_with_argv(
        ["spectro", "--fake", "--driver", "cm2002", "calibrate", "1"],
        spectro::OutputFormat::Json,
    )
    .await;

    let error = result.expect_err("black calibration is not available on the CM-2002");
    assert_eq!(
        "calibration step 1 is not supported by the Minolta CM-2002",
        error.to_string()
    );
    assert!(stdout.is_empty());
}

#[tokio::test(start_paused = true)]
async fn powered_off_instrument_cannot_be_opened() {
    let (result, _stdout) = run_with_argv(
        ["spectro", "--fake", "--fake-powered-off", "identify"],
        spectro::OutputFormat::Json,
    )
    .await;

    let error = result.expect_err("a powered-off instrument should not open");
    assert_eq!("failed to open the instrument connection", error.to_string());
}

#[tokio::test(start_paused = true)]
async fn silent_instrument_reports_a_timeout_fault() {
    let (result, stdout) = run_with_argv(
        [
            "spectro",
            "--fake",
            "--fake-silent",
            "2",
            "--response-timeout",
            "50ms",
            "identify",
        ],
        spectro::OutputFormat::Json,
    )
    .await;

    let error = result.expect_err("an unanswered identify should be reported");
    assert_eq!("instrument reported 1 error(s)", error.to_string());
    let report: Value = serde_json::from_str(&stdout).expect("output should be JSON");
    let faults = events_named(&report, "operational_status_changed");
    assert_eq!(1, faults.len());
    assert_eq!("timeout", faults[0]["status"]["fault"]);
    assert_eq!(4, events_named(&report, "settings_changed").len());
}

#[test]
fn measure_count_must_be_positive() {
    let result = spectro::Args::try_parse_from(["spectro", "--fake", "measure", "--count", "0"]);

    let error = result.expect_err("a zero count should be rejected");
    assert_eq!(ErrorKind::ValueValidation, error.kind());
}

#[test]
fn unknown_driver_is_rejected() {
    let result = spectro::Args::try_parse_from(["spectro", "--driver", "ci64", "identify"]);

    let error = result.expect_err("unknown drivers should fail argument parsing");
    assert_eq!(ErrorKind::InvalidValue, error.kind());
}
