use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use std::time::Duration;

use bon::Builder;
use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use tracing::Metadata;
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, filter, fmt};

use crate::cli::LogLevel;
use crate::error::TelemetryError;

/// Target prefix of every span and event this crate emits.
const CRATE_TARGET: &str = "spectro";
const DEFAULT_DIRECTIVES: &str = "warn";

static TRACING_INITIALISED: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// How the process reports its logs and session spans.
#[derive(Debug, Builder)]
pub(crate) struct TelemetryOptions {
    service_name: &'static str,
    /// Whether the caller's stderr is a terminal a person is watching.
    #[builder(default)]
    interactive_terminal: bool,
    /// Raises or lowers this crate's verbosity; dependencies stay at `warn`.
    /// Without it `RUST_LOG` decides.
    log_level: Option<LogLevel>,
}

impl TelemetryOptions {
    fn is_interactive(&self) -> bool {
        self.interactive_terminal && io::stderr().is_terminal()
    }

    fn log_filter(&self) -> EnvFilter {
        match self.log_level {
            Some(level) => EnvFilter::new(format!(
                "{DEFAULT_DIRECTIVES},{CRATE_TARGET}={}",
                level.as_level_filter()
            )),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
        }
    }

    /// Pretty logs under a spinner per running session operation on a
    /// terminal, JSON lines on stderr otherwise.
    fn output_layer(&self) -> OutputLayer {
        let log_filter = self.log_filter();
        if !self.is_interactive() {
            return fmt::layer()
                .json()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(log_filter)
                .boxed();
        }

        let indicatif_layer = IndicatifLayer::new()
            .with_progress_style(progress_style())
            .with_tick_settings(progress_tick_settings());
        fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(indicatif_layer.get_stderr_writer())
            .with_filter(log_filter)
            .and_then(indicatif_layer.with_filter(filter::filter_fn(progress_span_filter)))
            .boxed()
    }
}

/// Installs the global subscriber described by `options`.
///
/// Only the first call configures anything; later calls return its result.
pub(crate) fn initialise_tracing(options: &TelemetryOptions) -> Result<(), &'static TelemetryError> {
    TRACING_INITIALISED
        .get_or_init(|| initialise_tracing_once(options))
        .as_ref()
        .copied()
}

fn initialise_tracing_once(options: &TelemetryOptions) -> Result<(), TelemetryError> {
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().build();
    let tracer = tracer_provider.tracer(options.service_name);
    global::set_tracer_provider(tracer_provider);

    tracing_subscriber::registry()
        .with(options.output_layer())
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()?;
    Ok(())
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

fn progress_tick_settings() -> TickSettings {
    TickSettings {
        default_tick_interval: Some(Duration::from_millis(90)),
        ..TickSettings::default()
    }
}

/// Spinners only for this crate's session operations, not for every span.
fn progress_span_filter(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && metadata.target().starts_with(CRATE_TARGET)
        && matches!(
            *metadata.level(),
            tracing::Level::INFO | tracing::Level::WARN | tracing::Level::ERROR
        )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[rstest]
    #[case::debug(LogLevel::Debug, LevelFilter::DEBUG, "spectro=debug")]
    #[case::trace(LogLevel::Trace, LevelFilter::TRACE, "spectro=trace")]
    fn explicit_level_applies_to_this_crate(
        #[case] level: LogLevel,
        #[case] hint: LevelFilter,
        #[case] directive: &str,
    ) {
        let options = TelemetryOptions::builder()
            .service_name("spectro-test")
            .log_level(level)
            .build();

        let filter = options.log_filter();

        assert_eq!(Some(hint), filter.max_level_hint());
        assert!(filter.to_string().contains(directive));
    }

    #[test]
    fn explicit_error_level_keeps_dependencies_at_warn() {
        let options = TelemetryOptions::builder()
            .service_name("spectro-test")
            .log_level(LogLevel::Error)
            .build();

        assert_eq!(Some(LevelFilter::WARN), options.log_filter().max_level_hint());
    }

    #[test]
    fn terminal_output_is_opt_in() {
        let options = TelemetryOptions::builder()
            .service_name("spectro-test")
            .build();

        assert!(!options.is_interactive());
    }
}
