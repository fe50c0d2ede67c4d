//! Units of protocol work exchanged with an instrument.

mod frame;
mod reading;
mod status;

use std::fmt::Debug;

use serde::Serialize;
use strum_macros::{Display, EnumIter};

use crate::settings::{SettingField, SettingsUpdate};

pub use self::frame::{Line, Terminator};
pub use self::reading::{Measurement, SpectralReading};
pub use self::status::{FaultKind, InstrumentStatus, Severity};

/// One request/response exchange with an instrument.
///
/// A command is created by a driver, queued by the session, sent once, and
/// consumed when a response decodes to [`Decoded::Complete`]. Commands that
/// need more than one chunk to decide may keep state between `decode` calls.
pub trait Command: Send + Debug {
    /// Short diagnostic name used in logs and events.
    fn name(&self) -> &'static str;

    /// Request bytes, including any line terminator.
    fn encode(&self) -> Vec<u8>;

    /// Interprets the accumulated response buffer.
    fn decode(&mut self, response: &[u8]) -> Decoded;

    /// The instrument setting this command applies, if any.
    fn setting(&self) -> Option<SettingField> {
        None
    }
}

pub type BoxedCommand = Box<dyn Command>;

/// Result of offering a response buffer to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Complete(Outcome),
    /// Keep accumulating bytes.
    Incomplete,
    /// The buffer is not a response to this command.
    Unrecognized,
}

/// Structured result of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Measured(Measurement),
    Calibrated {
        step: CalibrationStep,
        status: InstrumentStatus,
    },
    SettingsChanged {
        update: SettingsUpdate,
        status: InstrumentStatus,
    },
    Identified {
        serial_number: String,
        status: InstrumentStatus,
    },
    /// A response with nothing to report beyond its status.
    Acknowledged(InstrumentStatus),
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        match self {
            Self::Measured(measurement) => measurement.status(),
            Self::Calibrated { status, .. }
            | Self::SettingsChanged { status, .. }
            | Self::Identified { status, .. }
            | Self::Acknowledged(status) => status,
        }
    }
}

/// Calibration steps addressed by their numeric index.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalibrationStep {
    White = 0,
    Black = 1,
    Zero = 2,
}

impl CalibrationStep {
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::White),
            1 => Some(Self::Black),
            2 => Some(Self::Zero),
            _ => None,
        }
    }

    #[must_use]
    pub fn index(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn calibration_index_round_trips() {
        for step in CalibrationStep::iter() {
            assert_eq!(Some(step), CalibrationStep::from_index(step.index()));
        }
    }

    #[rstest]
    #[case(3)]
    #[case(255)]
    fn unknown_calibration_index_is_rejected(#[case] index: u8) {
        assert_eq!(None, CalibrationStep::from_index(index));
    }

    #[test]
    fn outcome_exposes_status_of_every_variant() {
        let warning = InstrumentStatus::from_code(Severity::Warning, 21, "lamp ageing");
        let outcome = Outcome::Calibrated {
            step: CalibrationStep::White,
            status: warning.clone(),
        };
        assert_eq!(&warning, outcome.status());
    }
}
