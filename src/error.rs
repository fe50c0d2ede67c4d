use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::drivers::DriverModel;
use crate::queue::FifoError;

/// Errors returned by serial transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open instrument connection on `{port}`")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },
    #[error("instrument connection is not open")]
    NotOpen,
    #[error("serial I/O failed")]
    Io(#[from] io::Error),
}

/// Errors returned synchronously to callers of an instrument session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The outgoing command queue cannot take the request right now.
    #[error("instrument is busy: the command queue is full (capacity {capacity}), retry later")]
    Busy { capacity: usize },
    #[error("failed to open the instrument connection")]
    TransportOpen(#[source] TransportError),
    #[error("instrument session is not connected; apply settings first")]
    NotConnected,
    #[error("calibration step {step} is not supported by the {model}")]
    UnsupportedCalibration { step: u8, model: DriverModel },
    #[error("`{operation}` is not supported by the {model}")]
    UnsupportedOperation {
        operation: &'static str,
        model: DriverModel,
    },
    #[error("instrument session has been disposed")]
    Disposed,
}

impl From<FifoError> for SessionError {
    fn from(error: FifoError) -> Self {
        match error {
            FifoError::Full { capacity } => Self::Busy { capacity },
            FifoError::Closed => Self::Disposed,
        }
    }
}

/// Errors returned while loading instrument settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings file `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no configuration directory is available on this platform")]
    NoConfigDirectory,
}

/// Errors returned when validating runtime CLI options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("no serial port configured: pass --port, --settings, or create `{}`", path.display())]
    MissingConnection { path: PathBuf },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn full_queue_maps_to_busy() {
        let error = SessionError::from(FifoError::Full { capacity: 5 });
        assert_matches!(error, SessionError::Busy { capacity: 5 });
    }

    #[test]
    fn closed_queue_maps_to_disposed() {
        let error = SessionError::from(FifoError::Closed);
        assert_matches!(error, SessionError::Disposed);
    }
}
