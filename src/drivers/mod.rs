//! Vendor command sets behind one driver contract.

mod color_eye;
mod minolta_cm;
mod xrite_sp;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::command::{BoxedCommand, CalibrationStep, Outcome};
use crate::settings::{InstrumentSettings, SettingField};
use crate::transport::FakeInstrument;

pub use self::color_eye::ColorEye;
pub use self::minolta_cm::MinoltaCm;
pub use self::xrite_sp::XriteSp;

/// Response window used when neither the driver nor the connection overrides it.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Supported instrument families.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DriverModel {
    #[strum(to_string = "Gretag-Macbeth Color-Eye 7000")]
    Ce7000,
    #[strum(to_string = "Minolta CM-2002")]
    Cm2002,
    #[strum(to_string = "X-Rite SP62")]
    Sp62,
}

impl DriverModel {
    #[must_use]
    pub fn driver(self) -> Arc<dyn InstrumentDriver> {
        match self {
            Self::Ce7000 => Arc::new(ColorEye),
            Self::Cm2002 => Arc::new(MinoltaCm),
            Self::Sp62 => Arc::new(XriteSp),
        }
    }

    /// A fake instrument that speaks this model's protocol.
    #[must_use]
    pub fn simulator(self, serial_number: &str) -> FakeInstrument {
        match self {
            Self::Ce7000 => color_eye::simulator(serial_number),
            Self::Cm2002 => minolta_cm::simulator(serial_number),
            Self::Sp62 => xrite_sp::simulator(serial_number),
        }
    }
}

/// What a session needs to know about one instrument family.
///
/// Drivers only build commands; queueing, matching responses and recovery
/// belong to the session. Operations a model cannot perform return `None`.
pub trait InstrumentDriver: Send + Sync + Debug {
    fn model(&self) -> DriverModel;

    fn response_timeout(&self) -> Duration {
        DEFAULT_RESPONSE_TIMEOUT
    }

    /// Sent once after the transport opens, ahead of the initial settings.
    fn connect_commands(&self) -> Vec<BoxedCommand>;

    fn measure_commands(&self) -> Vec<BoxedCommand>;

    fn calibration_commands(&self, step: CalibrationStep) -> Option<Vec<BoxedCommand>>;

    /// Command applying one field of `settings`, or `None` when the model has
    /// no such setting.
    fn setting_command(
        &self,
        field: SettingField,
        settings: &InstrumentSettings,
    ) -> Option<BoxedCommand>;

    /// Commands moving the instrument from `previous` to `next`. Without a
    /// previous snapshot every supported field is sent.
    fn settings_commands(
        &self,
        previous: Option<&InstrumentSettings>,
        next: &InstrumentSettings,
    ) -> Vec<BoxedCommand> {
        let fields = match previous {
            Some(previous) => next.changed_fields(previous),
            None => SettingField::iter().collect(),
        };
        fields
            .into_iter()
            .filter_map(|field| self.setting_command(field, next))
            .collect()
    }

    /// Cheap request used to check whether the instrument is still alive.
    fn probe_command(&self) -> BoxedCommand;

    fn stored_sample_commands(&self, _index: u16) -> Option<Vec<BoxedCommand>> {
        None
    }

    /// Best-effort interpretation of bytes no queued command recognised.
    fn guess(&self, _response: &[u8]) -> Option<Outcome> {
        None
    }
}

/// Two-way mapping between setting values and their wire codes.
#[derive(Debug)]
pub(crate) struct CodeTable<T: 'static>(&'static [(T, &'static str)]);

impl<T: Copy + PartialEq> CodeTable<T> {
    pub(crate) fn code(&self, value: T) -> &'static str {
        self.0
            .iter()
            .find(|(candidate, _code)| *candidate == value)
            .map_or("?", |(_value, code)| code)
    }

    pub(crate) fn value(&self, code: &str) -> Option<T> {
        self.0
            .iter()
            .find(|(_value, candidate)| *candidate == code)
            .map(|(value, _code)| *value)
    }
}

/// Parses comma-separated reflectance samples.
pub(crate) fn parse_samples(raw: &str) -> Option<Vec<f64>> {
    raw.split(',')
        .map(|sample| sample.trim().parse::<f64>().ok())
        .collect()
}

/// Deterministic 31-point curve for simulated measurements.
pub(crate) fn simulated_samples(count: usize) -> String {
    (0..count)
        .map(|index| format!("{:.4}", 0.05 + 0.025 * index as f64))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::settings::{Aperture, ConnectionConfig, LensPosition, SpecularMode};

    fn settings() -> InstrumentSettings {
        InstrumentSettings::builder()
            .connection(ConnectionConfig::builder().port("COM1").build())
            .build()
    }

    #[rstest]
    #[case(DriverModel::Ce7000, 4)]
    #[case(DriverModel::Cm2002, 3)]
    #[case(DriverModel::Sp62, 1)]
    fn initial_settings_send_every_supported_field(
        #[case] model: DriverModel,
        #[case] expected: usize,
    ) {
        let commands = model.driver().settings_commands(None, &settings());
        assert_eq!(expected, commands.len());
    }

    #[rstest]
    #[case(DriverModel::Ce7000)]
    #[case(DriverModel::Cm2002)]
    #[case(DriverModel::Sp62)]
    fn identical_settings_send_nothing(#[case] model: DriverModel) {
        let commands = model.driver().settings_commands(Some(&settings()), &settings());
        assert!(commands.is_empty());
    }

    #[test]
    fn unsupported_field_changes_are_skipped() {
        let next = settings().with_lens_position(LensPosition::Small);
        let commands = DriverModel::Sp62
            .driver()
            .settings_commands(Some(&settings()), &next);
        assert!(commands.is_empty());
    }

    #[test]
    fn one_changed_field_sends_one_command() {
        let next = settings().with_specular(SpecularMode::Excluded);
        let commands = DriverModel::Ce7000
            .driver()
            .settings_commands(Some(&settings()), &next);
        assert_eq!(vec!["set_specular"], names(&commands));
    }

    #[test]
    fn code_table_maps_both_ways() {
        const TABLE: CodeTable<Aperture> =
            CodeTable(&[(Aperture::Large, "L"), (Aperture::Small, "S")]);
        assert_eq!("S", TABLE.code(Aperture::Small));
        assert_eq!(Some(Aperture::Large), TABLE.value("L"));
        assert_eq!(None, TABLE.value("X"));
    }

    #[test]
    fn samples_parse_or_fail_as_a_whole() {
        assert_eq!(Some(vec![0.5, 0.25]), parse_samples("0.5, 0.25"));
        assert_eq!(None, parse_samples("0.5,x"));
    }

    fn names(commands: &[BoxedCommand]) -> Vec<&'static str> {
        commands.iter().map(|command| command.name()).collect()
    }
}
