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

const TERMINATOR: Terminator = Terminator::Cr;

const APERTURES: CodeTable<Aperture> = CodeTable(&[
    (Aperture::Large, "0"),
    (Aperture::Medium, "1"),
    (Aperture::Small, "2"),
    (Aperture::UltraSmall, "3"),
]);
const SPECULAR: CodeTable<SpecularMode> =
    CodeTable(&[(SpecularMode::Included, "0"), (SpecularMode::Excluded, "1")]);
const FILTERS: CodeTable<LightFilter> = CodeTable(&[
    (LightFilter::None, "0"),
    (LightFilter::UvIncluded, "1"),
    (LightFilter::UvExcluded, "2"),
    (LightFilter::D65, "3"),
]);

static SERIAL_BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CM-?2002,(\d{8})").expect("serial banner pattern is valid"));

/// Minolta CM-2002 family.
///
/// Replies carry no echo: `OK00`, `OK00,<payload>` or `ERnn`, so each command
/// checks the payload shape it expects. A measurement is a trigger (`MES`)
/// followed by a data read (`BDR`). The zoom lens follows the aperture and
/// cannot be set on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinoltaCm;

impl InstrumentDriver for MinoltaCm {
    fn model(&self) -> DriverModel {
        DriverModel::Cm2002
    }

    fn connect_commands(&self) -> Vec<BoxedCommand> {
        vec![boxed(Request::Identify)]
    }

    fn measure_commands(&self) -> Vec<BoxedCommand> {
        vec![boxed(Request::Trigger), boxed(Request::ReadData)]
    }

    fn calibration_commands(&self, step: CalibrationStep) -> Option<Vec<BoxedCommand>> {
        match step {
            CalibrationStep::White | CalibrationStep::Zero => {
                Some(vec![boxed(Request::Calibrate(step))])
            }
            CalibrationStep::Black => None,
        }
    }

    fn setting_command(
        &self,
        field: SettingField,
        settings: &InstrumentSettings,
    ) -> Option<BoxedCommand> {
        match field {
            SettingField::Aperture => Some(boxed(Request::Aperture(settings.aperture()))),
            SettingField::Specular => Some(boxed(Request::Specular(settings.specular()))),
            SettingField::LightFilter => Some(boxed(Request::Filter(settings.light_filter()))),
            SettingField::LensPosition => None,
        }
    }

    fn probe_command(&self) -> BoxedCommand {
        boxed(Request::Identify)
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
    Trigger,
    ReadData,
    Calibrate(CalibrationStep),
    Aperture(Aperture),
    Specular(SpecularMode),
    Filter(LightFilter),
}

impl Request {
    fn body(self) -> String {
        match self {
            Self::Identify => "IDR".to_owned(),
            Self::Trigger => "MES".to_owned(),
            Self::ReadData => "BDR".to_owned(),
            Self::Calibrate(CalibrationStep::Zero) => "CAL,Z".to_owned(),
            Self::Calibrate(_) => "CAL,W".to_owned(),
            Self::Aperture(aperture) => format!("SET,A,{}", APERTURES.code(aperture)),
            Self::Specular(specular) => format!("SET,S,{}", SPECULAR.code(specular)),
            Self::Filter(filter) => format!("SET,F,{}", FILTERS.code(filter)),
        }
    }

    /// Settings are confirmed by a bare `OK`, so the update comes from the
    /// request itself.
    fn confirmed_update(self) -> SettingsUpdate {
        match self {
            Self::Aperture(aperture) => SettingsUpdate::default()
                .with_aperture(aperture)
                .with_lens_position(lens_for(aperture)),
            Self::Specular(specular) => SettingsUpdate::default().with_specular(specular),
            Self::Filter(filter) => SettingsUpdate::default().with_light_filter(filter),
            Self::Identify | Self::Trigger | Self::ReadData | Self::Calibrate(_) => {
                SettingsUpdate::default()
            }
        }
    }

    fn interpret(self, status: InstrumentStatus, payload: Option<&str>) -> Option<Outcome> {
        if status.is_error() {
            return Some(match self {
                Self::ReadData => Outcome::Measured(Measurement::new(status, None)),
                Self::Calibrate(step) => Outcome::Calibrated { step, status },
                Self::Aperture(_) | Self::Specular(_) | Self::Filter(_) => {
                    Outcome::SettingsChanged {
                        update: SettingsUpdate::default(),
                        status,
                    }
                }
                Self::Identify | Self::Trigger => Outcome::Acknowledged(status),
            });
        }
        match (self, payload) {
            (Self::Identify, Some(payload)) => {
                let (model, serial_number) = payload.split_once(',')?;
                if !model.starts_with("CM") {
                    return None;
                }
                Some(Outcome::Identified {
                    serial_number: serial_number.trim().to_owned(),
                    status,
                })
            }
            (Self::ReadData, Some(payload)) => {
                let reading = parse_reading(payload)?;
                Some(Outcome::Measured(Measurement::new(status, Some(reading))))
            }
            (Self::Trigger, None) => Some(Outcome::Acknowledged(status)),
            (Self::Calibrate(step), None) => Some(Outcome::Calibrated { step, status }),
            (Self::Aperture(_) | Self::Specular(_) | Self::Filter(_), None) => {
                Some(Outcome::SettingsChanged {
                    update: self.confirmed_update(),
                    status,
                })
            }
            _ => None,
        }
    }
}

fn lens_for(aperture: Aperture) -> LensPosition {
    match aperture {
        Aperture::Large | Aperture::Medium => LensPosition::Large,
        Aperture::Small | Aperture::UltraSmall => LensPosition::Small,
    }
}

#[derive(Debug)]
struct MinoltaCommand {
    request: Request,
}

fn boxed(request: Request) -> BoxedCommand {
    Box::new(MinoltaCommand { request })
}

impl Command for MinoltaCommand {
    fn name(&self) -> &'static str {
        match self.request {
            Request::Identify => "identify",
            Request::Trigger => "measure_trigger",
            Request::ReadData => "measure_read",
            Request::Calibrate(CalibrationStep::Zero) => "calibrate_zero",
            Request::Calibrate(_) => "calibrate_white",
            Request::Aperture(_) => "set_aperture",
            Request::Specular(_) => "set_specular",
            Request::Filter(_) => "set_light_filter",
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
        let Some((status, payload)) = parse_reply(line) else {
            return Decoded::Unrecognized;
        };
        self.request
            .interpret(status, payload)
            .map_or(Decoded::Unrecognized, Decoded::Complete)
    }

    fn setting(&self) -> Option<SettingField> {
        match self.request {
            Request::Aperture(_) => Some(SettingField::Aperture),
            Request::Specular(_) => Some(SettingField::Specular),
            Request::Filter(_) => Some(SettingField::LightFilter),
            Request::Identify | Request::Trigger | Request::ReadData | Request::Calibrate(_) => {
                None
            }
        }
    }
}

/// Splits `OKnn[,payload]` / `ERnn` into a status and optional payload.
fn parse_reply(line: &str) -> Option<(InstrumentStatus, Option<&str>)> {
    let (head, payload) = match line.split_once(',') {
        Some((head, payload)) => (head, Some(payload)),
        None => (line, None),
    };
    let (kind, code) = head.split_at_checked(2)?;
    let code: u16 = code.parse().ok()?;
    let status = match (kind, code) {
        ("OK", 0) => InstrumentStatus::success(),
        ("OK", 1..=19) => InstrumentStatus::from_code(Severity::Info, code, "instrument notice"),
        ("OK", _) => InstrumentStatus::from_code(Severity::Warning, code, warning_text(code)),
        ("ER", _) => InstrumentStatus::from_code(Severity::Error, code, error_text(code)),
        _ => return None,
    };
    Some((status, payload))
}

fn warning_text(code: u16) -> &'static str {
    match code {
        20 => "white calibration recommended",
        21 => "battery low",
        _ => "instrument warning",
    }
}

fn error_text(code: u16) -> &'static str {
    match code {
        0 => "command rejected",
        10 => "measurement not triggered",
        11 => "white calibration failed",
        12 => "zero calibration failed",
        20 => "flash lamp did not fire",
        _ => "instrument fault",
    }
}

/// `<start>,<interval>,<v1>,<v2>,...`
fn parse_reading(payload: &str) -> Option<SpectralReading> {
    let mut parts = payload.splitn(3, ',');
    let start = parts.next()?.trim().parse().ok()?;
    let interval = parts.next()?.trim().parse().ok()?;
    let samples = parse_samples(parts.next()?)?;
    Some(SpectralReading::from_uniform(start, interval, samples))
}

pub(super) fn simulator(serial_number: &str) -> FakeInstrument {
    let serial_number = serial_number.to_owned();
    FakeInstrument::new(move |request| {
        let text = String::from_utf8_lossy(request);
        let body = match text.trim() {
            "IDR" => format!("OK00,CM-2002,{serial_number}"),
            "BDR" => format!("OK00,400,10,{}", simulated_samples(31)),
            "MES" | "CAL,W" | "CAL,Z" => "OK00".to_owned(),
            other if other.starts_with("SET,") => "OK00".to_owned(),
            _ => "ER00".to_owned(),
        };
        Reply::Respond(TERMINATOR.frame(&body))
    })
}
