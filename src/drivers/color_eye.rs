use std::sync::LazyLock;

use regex::Regex;

use super::{CodeTable, DriverModel, InstrumentDriver, parse_samples, simulated_samples};
use crate::command::{
    BoxedCommand, CalibrationStep, Command, Decoded, InstrumentStatus, Line, Measurement, Outcome,
    Severity, SpectralReading, Terminator,
};
use crate::settings::{
    Aperture, InstrumentSettings, LensPosition, LightFilter, SettingField, SettingsUpdate,
    SpecularMode,
};
use crate::transport::{FakeInstrument, Reply};

const TERMINATOR: Terminator = Terminator::CrLf;

const APERTURES: CodeTable<Aperture> = CodeTable(&[
    (Aperture::Large, "L"),
    (Aperture::Medium, "M"),
    (Aperture::Small, "S"),
    (Aperture::UltraSmall, "U"),
]);
const SPECULAR: CodeTable<SpecularMode> =
    CodeTable(&[(SpecularMode::Included, "I"), (SpecularMode::Excluded, "E")]);
const FILTERS: CodeTable<LightFilter> = CodeTable(&[
    (LightFilter::None, "N"),
    (LightFilter::UvIncluded, "I"),
    (LightFilter::UvExcluded, "E"),
    (LightFilter::D65, "D"),
]);
const LENSES: CodeTable<LensPosition> =
    CodeTable(&[(LensPosition::Large, "L"), (LensPosition::Small, "S")]);

static SERIAL_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CE\s?7000.*S/N\s*([A-Z0-9]+)").expect("serial banner pattern is valid")
});

/// Gretag-Macbeth Color-Eye 7000 family.
///
/// Requests are a token plus an optional argument. Every reply starts with a
/// two-digit status and echoes the token, e.g. `00 M 400 10 0.0500,...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorEye;

impl InstrumentDriver for ColorEye {
    fn model(&self) -> DriverModel {
        DriverModel::Ce7000
    }

    fn connect_commands(&self) -> Vec<BoxedCommand> {
        vec![boxed(Request::Identify)]
    }

    fn measure_commands(&self) -> Vec<BoxedCommand> {
        vec![boxed(Request::Measure)]
    }

    fn calibration_commands(&self, step: CalibrationStep) -> Option<Vec<BoxedCommand>> {
        match step {
            CalibrationStep::White | CalibrationStep::Black => {
                Some(vec![boxed(Request::Calibrate(step))])
            }
            CalibrationStep::Zero => None,
        }
    }

    fn setting_command(
        &self,
        field: SettingField,
        settings: &InstrumentSettings,
    ) -> Option<BoxedCommand> {
        let request = match field {
            SettingField::Aperture => Request::Aperture(settings.aperture()),
            SettingField::Specular => Request::Specular(settings.specular()),
            SettingField::LightFilter => Request::Filter(settings.light_filter()),
            SettingField::LensPosition => Request::Lens(settings.lens_position()),
        };
        Some(boxed(request))
    }

    fn probe_command(&self) -> BoxedCommand {
        boxed(Request::Reset)
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
    Calibrate(CalibrationStep),
    Aperture(Aperture),
    Specular(SpecularMode),
    Filter(LightFilter),
    Lens(LensPosition),
}

impl Request {
    fn token(self) -> &'static str {
        match self {
            Self::Identify => "SN",
            Self::Reset => "RS",
            Self::Measure => "M",
            Self::Calibrate(CalibrationStep::Black) => "CB",
            Self::Calibrate(_) => "CW",
            Self::Aperture(_) => "SA",
            Self::Specular(_) => "SS",
            Self::Filter(_) => "SF",
            Self::Lens(_) => "SL",
        }
    }

    fn argument(self) -> Option<&'static str> {
        match self {
            Self::Aperture(aperture) => Some(APERTURES.code(aperture)),
            Self::Specular(specular) => Some(SPECULAR.code(specular)),
            Self::Filter(filter) => Some(FILTERS.code(filter)),
            Self::Lens(lens) => Some(LENSES.code(lens)),
            Self::Identify | Self::Reset | Self::Measure | Self::Calibrate(_) => None,
        }
    }

    fn interpret(self, status: InstrumentStatus, payload: &str) -> Option<Outcome> {
        match self {
            Self::Identify | Self::Reset if status.is_error() || payload.is_empty() => {
                Some(Outcome::Acknowledged(status))
            }
            Self::Identify | Self::Reset => Some(Outcome::Identified {
                serial_number: payload.to_owned(),
                status,
            }),
            Self::Measure if status.is_error() => {
                Some(Outcome::Measured(Measurement::new(status, None)))
            }
            Self::Measure => {
                let reading = parse_reading(payload)?;
                Some(Outcome::Measured(Measurement::new(status, Some(reading))))
            }
            Self::Calibrate(step) => Some(Outcome::Calibrated { step, status }),
            Self::Aperture(_) | Self::Specular(_) | Self::Filter(_) | Self::Lens(_)
                if status.is_error() =>
            {
                Some(Outcome::SettingsChanged {
                    update: SettingsUpdate::default(),
                    status,
                })
            }
            Self::Aperture(_) => Some(settings_changed(
                SettingsUpdate::default().with_aperture(APERTURES.value(payload)?),
                status,
            )),
            Self::Specular(_) => Some(settings_changed(
                SettingsUpdate::default().with_specular(SPECULAR.value(payload)?),
                status,
            )),
            Self::Filter(_) => Some(settings_changed(
                SettingsUpdate::default().with_light_filter(FILTERS.value(payload)?),
                status,
            )),
            Self::Lens(_) => Some(settings_changed(
                SettingsUpdate::default().with_lens_position(LENSES.value(payload)?),
                status,
            )),
        }
    }
}

fn settings_changed(update: SettingsUpdate, status: InstrumentStatus) -> Outcome {
    Outcome::SettingsChanged { update, status }
}

#[derive(Debug)]
struct ColorEyeCommand {
    request: Request,
}

fn boxed(request: Request) -> BoxedCommand {
    Box::new(ColorEyeCommand { request })
}

impl Command for ColorEyeCommand {
    fn name(&self) -> &'static str {
        match self.request {
            Request::Identify => "identify",
            Request::Reset => "reset",
            Request::Measure => "measure",
            Request::Calibrate(CalibrationStep::Black) => "calibrate_black",
            Request::Calibrate(_) => "calibrate_white",
            Request::Aperture(_) => "set_aperture",
            Request::Specular(_) => "set_specular",
            Request::Filter(_) => "set_light_filter",
            Request::Lens(_) => "set_lens_position",
        }
    }

    fn encode(&self) -> Vec<u8> {
        let token = self.request.token();
        match self.request.argument() {
            Some(argument) => TERMINATOR.frame(&format!("{token} {argument}")),
            None => TERMINATOR.frame(token),
        }
    }

    fn decode(&mut self, response: &[u8]) -> Decoded {
        let line = match TERMINATOR.split(response) {
            Line::Complete(line) => line,
            Line::Partial => return Decoded::Incomplete,
            Line::Garbled => return Decoded::Unrecognized,
        };
        let Some(reply) = ReplyLine::parse(line) else {
            return Decoded::Unrecognized;
        };
        if reply.token != self.request.token() {
            return Decoded::Unrecognized;
        }
        self.request
            .interpret(status(reply.code), reply.payload)
            .map_or(Decoded::Unrecognized, Decoded::Complete)
    }

    fn setting(&self) -> Option<SettingField> {
        match self.request {
            Request::Aperture(_) => Some(SettingField::Aperture),
            Request::Specular(_) => Some(SettingField::Specular),
            Request::Filter(_) => Some(SettingField::LightFilter),
            Request::Lens(_) => Some(SettingField::LensPosition),
            Request::Identify | Request::Reset | Request::Measure | Request::Calibrate(_) => None,
        }
    }
}

struct ReplyLine<'a> {
    code: u16,
    token: &'a str,
    payload: &'a str,
}

impl<'a> ReplyLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let mut parts = line.splitn(3, ' ');
        let code = parts.next()?;
        if code.len() != 2 {
            return None;
        }
        Some(Self {
            code: code.parse().ok()?,
            token: parts.next()?,
            payload: parts.next().unwrap_or_default().trim(),
        })
    }
}

fn status(code: u16) -> InstrumentStatus {
    let severity = match code {
        0 => Severity::Success,
        1..=19 => Severity::Info,
        20..=29 => Severity::Warning,
        _ => Severity::Error,
    };
    let text = match code {
        0 => "",
        11 => "lamp warming up",
        21 => "calibration is older than eight hours",
        22 => "lamp intensity low",
        31 => "white tile reading out of range",
        32 => "sample port obstructed",
        40 => "command not recognised",
        _ => match severity {
            Severity::Info => "instrument notice",
            Severity::Warning => "instrument warning",
            Severity::Success | Severity::Error => "instrument fault",
        },
    };
    InstrumentStatus::from_code(severity, code, text)
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
            "SN" | "RS" => format!("00 {token} {serial_number}"),
            "M" => format!("00 M 400 10 {}", simulated_samples(31)),
            "CW" | "CB" => format!("00 {token}"),
            "SA" | "SS" | "SF" | "SL" => format!("00 {token} {argument}"),
            _ => format!("40 {token}"),
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
        ColorEyeCommand { request }.decode(response)
    }

    #[rstest]
    #[case(Request::Identify, "SN\r\n")]
    #[case(Request::Measure, "M\r\n")]
    #[case(Request::Calibrate(CalibrationStep::Black), "CB\r\n")]
    #[case(Request::Aperture(Aperture::UltraSmall), "SA U\r\n")]
    #[case(Request::Filter(LightFilter::D65), "SF D\r\n")]
    fn requests_encode_token_and_argument(#[case] request: Request, #[case] expected: &str) {
        let encoded = ColorEyeCommand { request }.encode();
        assert_eq!(expected.as_bytes(), encoded.as_slice());
    }

    #[test]
    fn measurement_decodes_into_reading() {
        let decoded = decode(Request::Measure, b"00 M 400 10 0.1,0.2,0.3\r\n");

        assert_matches!(decoded, Decoded::Complete(Outcome::Measured(measurement)) => {
            assert!(measurement.status().is_success());
            let reading = measurement.reading().expect("successful measurement carries a reading");
            assert_eq!(Some(420), reading.end());
            assert_eq!(Some(0.2), reading.get(410));
        });
    }

    #[test]
    fn measurement_error_carries_no_reading() {
        let decoded = decode(Request::Measure, b"32 M\r\n");

        assert_matches!(decoded, Decoded::Complete(Outcome::Measured(measurement)) => {
            assert!(measurement.status().is_error());
            assert_eq!(None, measurement.reading());
        });
    }

    #[rstest]
    #[case(b"00 M 400 10 0.1".as_slice(), Decoded::Incomplete)]
    #[case(b"00 SN 123\r\n".as_slice(), Decoded::Unrecognized)]
    #[case(b"00 M 400 ten 0.1\r\n".as_slice(), Decoded::Unrecognized)]
    #[case(b"\x15\x00\r\n".as_slice(), Decoded::Unrecognized)]
    fn measurement_rejects_foreign_or_partial_bytes(
        #[case] response: &[u8],
        #[case] expected: Decoded,
    ) {
        assert_eq!(expected, decode(Request::Measure, response));
    }

    #[test]
    fn setting_echo_reports_confirmed_value() {
        let decoded = decode(Request::Specular(SpecularMode::Excluded), b"00 SS E\r\n");

        assert_eq!(
            Decoded::Complete(Outcome::SettingsChanged {
                update: SettingsUpdate::default().with_specular(SpecularMode::Excluded),
                status: InstrumentStatus::success(),
            }),
            decoded
        );
    }

    #[test]
    fn warning_status_keeps_the_outcome() {
        let decoded = decode(Request::Calibrate(CalibrationStep::White), b"21 CW\r\n");

        assert_matches!(
            decoded,
            Decoded::Complete(Outcome::Calibrated { step: CalibrationStep::White, status })
                if status.severity() == Severity::Warning && !status.is_error()
        );
    }

    #[test]
    fn reset_reply_refreshes_serial_number() {
        let decoded = decode(Request::Reset, b"00 RS 70012345\r\n");

        assert_matches!(
            decoded,
            Decoded::Complete(Outcome::Identified { serial_number, .. }) if serial_number == "70012345"
        );
    }

    #[test]
    fn zero_calibration_is_unsupported() {
        assert!(ColorEye.calibration_commands(CalibrationStep::Zero).is_none());
        assert!(ColorEye.stored_sample_commands(1).is_none());
    }

    #[test]
    fn power_on_banner_is_guessed_as_identification() {
        let guessed = ColorEye.guess(b"GretagMacbeth CE7000A S/N 7A001234\r\n");

        assert_matches!(
            guessed,
            Some(Outcome::Identified { serial_number, .. }) if serial_number == "7A001234"
        );
        assert_eq!(None, ColorEye.guess(b"00 M\r\n"));
    }
}
