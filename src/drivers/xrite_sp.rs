use std::sync::LazyLock;

use regex::Regex;

use super::{CodeTable, DriverModel, InstrumentDriver, parse_samples, simulated_samples};
use crate::command::{
    BoxedCommand, CalibrationStep, Command, Decoded, InstrumentStatus, Line, Measurement, Outcome,
    Severity, SpectralReading, Terminator,
};
use crate::settings::{InstrumentSettings, SettingField, SettingsUpdate, SpecularMode};
use crate::transport::{FakeInstrument, Reply};

const TERMINATOR: Terminator = Terminator::Cr;
const STORED_SAMPLES: u16 = 10;

const SPECULAR: CodeTable<SpecularMode> =
    CodeTable(&[(SpecularMode::Included, "I"), (SpecularMode::Excluded, "E")]);

static STATUS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*<(\d{2})>$").expect("status suffix pattern is valid"));
static SERIAL_BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SP6[24]\b.*\bSN:?\s*(\d+)").expect("serial banner pattern is valid"));

/// X-Rite SP62 family.
///
/// Replies echo the request token and end in a `<nn>` status suffix, e.g.
/// `MS 400 20 0.05,... <00>`. The instrument keeps a small sample memory that
/// can be read back with `GS`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XriteSp;

impl InstrumentDriver for XriteSp {
    fn model(&self) -> DriverModel {
        DriverModel::Sp62
    }

    fn connect_commands(&self) -> Vec<BoxedCommand> {
        vec![boxed(Request::Identify)]
    }

    fn measure_commands(&self) -> Vec<BoxedCommand> {
        vec![boxed(Request::Measure)]
    }

    fn calibration_commands(&self, step: CalibrationStep) -> Option<Vec<BoxedCommand>> {
        match step {
            CalibrationStep::White => Some(vec![boxed(Request::CalibrateWhite)]),
            CalibrationStep::Black | CalibrationStep::Zero => None,
        }
    }

    fn setting_command(
        &self,
        field: SettingField,
        settings: &InstrumentSettings,
    ) -> Option<BoxedCommand> {
        match field {
            SettingField::Specular => Some(boxed(Request::Specular(settings.specular()))),
            SettingField::Aperture | SettingField::LightFilter | SettingField::LensPosition => None,
        }
    }

    fn probe_command(&self) -> BoxedCommand {
        boxed(Request::Reset)
    }

    fn stored_sample_commands(&self, index: u16) -> Option<Vec<BoxedCommand>> {
        Some(vec![boxed(Request::StoredSample(index))])
    }

    fn guess(&self, response: &[u8]) -> Option<Outcome> {
        let text = String::from_utf8_lossy(response);
        let captures = SERIAL_BANNER.captures(&text)?;
        Some(Outcome::Identified {
            serial_number: captures[1].to_owned(),
            status: InstrumentStatus::success(),
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Request {
    Identify,
    Reset,
    Measure,
    CalibrateWhite,
    Specular(SpecularMode),
    StoredSample(u16),
}

impl Request {
    fn token(self) -> &'static str {
        match self {
            Self::Identify => "SN",
            Self::Reset => "RS",
            Self::Measure => "MS",
            Self::CalibrateWhite => "CW",
            Self::Specular(_) => "SC",
            Self::StoredSample(_) => "GS",
        }
    }

    fn body(self) -> String {
        match self {
            Self::Specular(specular) => format!("SC {}", SPECULAR.code(specular)),
            Self::StoredSample(index) => format!("GS {index:02}"),
            Self::Identify | Self::Reset | Self::Measure | Self::CalibrateWhite => {
                self.token().to_owned()
            }
        }
    }

    fn interpret(self, status: InstrumentStatus, payload: &str) -> Option<Outcome> {
        match self {
            Self::Identify if status.is_error() || payload.is_empty() => {
                Some(Outcome::Acknowledged(status))
            }
            Self::Identify => Some(Outcome::Identified {
                serial_number: payload.to_owned(),
                status,
            }),
            Self::Reset => Some(Outcome::Acknowledged(status)),
            Self::Measure | Self::StoredSample(_) if status.is_error() => {
                Some(Outcome::Measured(Measurement::new(status, None)))
            }
            Self::Measure => parse_reading(payload)
                .map(|reading| Outcome::Measured(Measurement::new(status, Some(reading)))),
            Self::StoredSample(index) => {
                let (echoed, reading) = payload.split_once(' ')?;
                if echoed.parse::<u16>().ok()? != index {
                    return None;
                }
                let reading = parse_reading(reading)?;
                Some(Outcome::Measured(Measurement::new(
                    status.with_message(format!("stored sample {index}")),
                    Some(reading),
                )))
            }
            Self::CalibrateWhite => Some(Outcome::Calibrated {
                step: CalibrationStep::White,
                status,
            }),
            Self::Specular(_) if status.is_error() => Some(Outcome::SettingsChanged {
                update: SettingsUpdate::default(),
                status,
            }),
            Self::Specular(_) => Some(Outcome::SettingsChanged {
                update: SettingsUpdate::default().with_specular(SPECULAR.value(payload)?),
                status,
            }),
        }
    }
}

#[derive(Debug)]
struct XriteCommand {
    request: Request,
}

fn boxed(request: Request) -> BoxedCommand {
    Box::new(XriteCommand { request })
}

impl Command for XriteCommand {
    fn name(&self) -> &'static str {
        match self.request {
            Request::Identify => "identify",
            Request::Reset => "reset",
            Request::Measure => "measure",
            Request::CalibrateWhite => "calibrate_white",
            Request::Specular(_) => "set_specular",
            Request::StoredSample(_) => "retrieve_stored_sample",
        }
    }

    fn encode(&self) -> Vec<u8> {
        TERMINATOR.frame(&self.request.body())
    }

    fn decode(&mut self, response: &[u8]) -> Decoded {
        let line = match TERMINATOR.split(response) {
            Line::Complete(line) => line,
            Line::Partial => return Decoded::Incomplete,
            Line::Garbled => return Decoded::Unrecognized,
        };
        let Some(captures) = STATUS_SUFFIX.captures(line) else {
            return Decoded::Unrecognized;
        };
        let Ok(code) = captures[2].parse::<u16>() else {
            return Decoded::Unrecognized;
        };
        let Some(echoed) = captures.get(1).map(|body| body.as_str()) else {
            return Decoded::Unrecognized;
        };
        let (token, payload) = echoed.split_once(' ').unwrap_or((echoed, ""));
        if token != self.request.token() {
            return Decoded::Unrecognized;
        }
        self.request
            .interpret(status(code), payload.trim())
            .map_or(Decoded::Unrecognized, Decoded::Complete)
    }

    fn setting(&self) -> Option<SettingField> {
        match self.request {
            Request::Specular(_) => Some(SettingField::Specular),
            _ => None,
        }
    }
}

fn status(code: u16) -> InstrumentStatus {
    match code {
        0 => InstrumentStatus::success(),
        1..=9 => InstrumentStatus::from_code(Severity::Info, code, "instrument notice"),
        10..=19 => InstrumentStatus::from_code(Severity::Warning, code, "calibration due"),
        24 => InstrumentStatus::from_code(Severity::Error, code, "no stored sample at index"),
        _ => InstrumentStatus::from_code(Severity::Error, code, "instrument fault"),
    }
}

/// `<start> <interval> <v1>,<v2>,...`
fn parse_reading(payload: &str) -> Option<SpectralReading> {
    let mut parts = payload.split_whitespace();
    let start = parts.next()?.parse().ok()?;
    let interval = parts.next()?.parse().ok()?;
    let samples = parse_samples(parts.next()?)?;
    Some(SpectralReading::from_uniform(start, interval, samples))
}

pub(super) fn simulator(serial_number: &str) -> FakeInstrument {
    let serial_number = serial_number.to_owned();
    FakeInstrument::new(move |request| {
        let text = String::from_utf8_lossy(request);
        let mut words = text.split_whitespace();
        let token = words.next().unwrap_or_default();
        let argument = words.next().unwrap_or_default();
        let body = match token {
            "SN" => format!("SN {serial_number} <00>"),
            "RS" | "CW" => format!("{token} <00>"),
            "MS" => format!("MS 400 20 {} <00>", simulated_samples(16)),
            "SC" => format!("SC {argument} <00>"),
            "GS" => match argument.parse::<u16>() {
                Ok(index) if index < STORED_SAMPLES => {
                    format!("GS {index:02} 400 20 {} <00>", simulated_samples(16))
                }
                _ => "GS <24>".to_owned(),
            },
            _ => format!("{token} <30>"),
        };
        Reply::Respond(TERMINATOR.frame(&body))
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn decode(request: Request, response: &[u8]) -> Decoded {
        XriteCommand { request }.decode(response)
    }

    #[test]
    fn stored_sample_is_read_back_as_a_measurement() {
        let decoded = decode(Request::StoredSample(3), b"GS 03 400 20 0.1,0.2 <00>\r");

        assert_matches!(decoded, Decoded::Complete(Outcome::Measured(measurement)) => {
            assert_eq!(["stored sample 3".to_string()], measurement.status().messages());
            assert_eq!(Some(420), measurement.reading().and_then(SpectralReading::end));
        });
    }

    #[test]
    fn missing_stored_sample_is_an_error_measurement() {
        let decoded = decode(Request::StoredSample(40), b"GS <24>\r");

        assert_matches!(decoded, Decoded::Complete(Outcome::Measured(measurement)) => {
            assert!(measurement.status().is_error());
            assert_eq!(None, measurement.reading());
        });
    }

    #[rstest]
    #[case(Request::Measure, b"MS 400 20 0.1 <0".as_slice(), Decoded::Incomplete)]
    #[case(Request::Measure, b"MS 400 20 0.1\r".as_slice(), Decoded::Unrecognized)]
    #[case(Request::Measure, b"SN 123 <00>\r".as_slice(), Decoded::Unrecognized)]
    #[case(Request::StoredSample(2), b"GS 05 400 20 0.1 <00>\r".as_slice(), Decoded::Unrecognized)]
    fn mismatched_replies_are_not_accepted(
        #[case] request: Request,
        #[case] response: &[u8],
        #[case] expected: Decoded,
    ) {
        assert_eq!(expected, decode(request, response));
    }

    #[test]
    fn reset_is_acknowledged() {
        assert_eq!(
            Decoded::Complete(Outcome::Acknowledged(InstrumentStatus::success())),
            decode(Request::Reset, b"RS <00>\r")
        );
    }

    #[test]
    fn only_white_calibration_and_specular_are_supported() {
        assert!(XriteSp.calibration_commands(CalibrationStep::White).is_some());
        assert!(XriteSp.calibration_commands(CalibrationStep::Black).is_none());
        assert!(XriteSp.calibration_commands(CalibrationStep::Zero).is_none());
    }

    #[test]
    fn power_on_banner_is_guessed() {
        assert_matches!(
            XriteSp.guess(b"X-Rite SP62 V4.10 SN:620987\r"),
            Some(Outcome::Identified { serial_number, .. }) if serial_number == "620987"
        );
    }
}
