use std::fs;
use std::path::{Path, PathBuf};

use bon::Builder;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::ConnectionConfig;
use crate::error::SettingsError;

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Measurement aperture (viewing area).
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Aperture {
    #[default]
    Large,
    Medium,
    Small,
    UltraSmall,
}

/// Whether the specular component is included in the reading.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SpecularMode {
    #[default]
    Included,
    Excluded,
}

/// Illumination filter in the light path.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LightFilter {
    #[default]
    None,
    UvIncluded,
    UvExcluded,
    D65,
}

/// Zoom lens position.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LensPosition {
    #[default]
    Large,
    Small,
}

/// One instrument-side setting that can be changed independently.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SettingField {
    Aperture,
    Specular,
    LightFilter,
    LensPosition,
}

/// Complete instrument configuration: how to connect and how to measure.
#[derive(Debug, Clone, Eq, PartialEq, Builder, Serialize, Deserialize)]
pub struct InstrumentSettings {
    connection: ConnectionConfig,
    #[builder(default)]
    #[serde(default)]
    aperture: Aperture,
    #[builder(default)]
    #[serde(default)]
    specular: SpecularMode,
    #[builder(default)]
    #[serde(default)]
    light_filter: LightFilter,
    #[builder(default)]
    #[serde(default)]
    lens_position: LensPosition,
}

impl InstrumentSettings {
    #[must_use]
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    #[must_use]
    pub fn aperture(&self) -> Aperture {
        self.aperture
    }

    #[must_use]
    pub fn specular(&self) -> SpecularMode {
        self.specular
    }

    #[must_use]
    pub fn light_filter(&self) -> LightFilter {
        self.light_filter
    }

    #[must_use]
    pub fn lens_position(&self) -> LensPosition {
        self.lens_position
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = aperture;
        self
    }

    #[must_use]
    pub fn with_specular(mut self, specular: SpecularMode) -> Self {
        self.specular = specular;
        self
    }

    #[must_use]
    pub fn with_light_filter(mut self, light_filter: LightFilter) -> Self {
        self.light_filter = light_filter;
        self
    }

    #[must_use]
    pub fn with_lens_position(mut self, lens_position: LensPosition) -> Self {
        self.lens_position = lens_position;
        self
    }

    /// Returns the instrument-side fields whose values differ from `previous`,
    /// in a stable order. Connection parameters are not compared.
    ///
    /// ```
    /// use spectro::{ConnectionConfig, InstrumentSettings, SettingField, SpecularMode};
    ///
    /// let connection = ConnectionConfig::builder().port("COM3").build();
    /// let before = InstrumentSettings::builder().connection(connection).build();
    /// let after = before.clone().with_specular(SpecularMode::Excluded);
    ///
    /// assert_eq!(vec![SettingField::Specular], after.changed_fields(&before));
    /// assert!(after.changed_fields(&after).is_empty());
    /// ```
    #[must_use]
    pub fn changed_fields(&self, previous: &Self) -> Vec<SettingField> {
        SettingField::iter()
            .filter(|field| match field {
                SettingField::Aperture => self.aperture != previous.aperture,
                SettingField::Specular => self.specular != previous.specular,
                SettingField::LightFilter => self.light_filter != previous.light_filter,
                SettingField::LensPosition => self.lens_position != previous.lens_position,
            })
            .collect()
    }

    /// Overwrites the fields an instrument reported back.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(aperture) = update.aperture {
            self.aperture = aperture;
        }
        if let Some(specular) = update.specular {
            self.specular = specular;
        }
        if let Some(light_filter) = update.light_filter {
            self.light_filter = light_filter;
        }
        if let Some(lens_position) = update.lens_position {
            self.lens_position = lens_position;
        }
    }

    /// Loads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not valid settings TOML.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default settings file location in the platform configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        ProjectDirs::from("", "", "spectro")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
            .ok_or(SettingsError::NoConfigDirectory)
    }
}

/// Settings values confirmed by an instrument response.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SettingsUpdate {
    aperture: Option<Aperture>,
    specular: Option<SpecularMode>,
    light_filter: Option<LightFilter>,
    lens_position: Option<LensPosition>,
}

impl SettingsUpdate {
    #[must_use]
    pub fn with_aperture(mut self, aperture: Aperture) -> Self {
        self.aperture = Some(aperture);
        self
    }

    #[must_use]
    pub fn with_specular(mut self, specular: SpecularMode) -> Self {
        self.specular = Some(specular);
        self
    }

    #[must_use]
    pub fn with_light_filter(mut self, light_filter: LightFilter) -> Self {
        self.light_filter = Some(light_filter);
        self
    }

    #[must_use]
    pub fn with_lens_position(mut self, lens_position: LensPosition) -> Self {
        self.lens_position = Some(lens_position);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::settings::FlowControl;

    fn settings() -> InstrumentSettings {
        InstrumentSettings::builder()
            .connection(ConnectionConfig::builder().port("/dev/ttyS0").build())
            .build()
    }

    #[rstest]
    #[case(settings().with_aperture(Aperture::Small), vec![SettingField::Aperture])]
    #[case(settings().with_lens_position(LensPosition::Small), vec![SettingField::LensPosition])]
    #[case(
        settings().with_specular(SpecularMode::Excluded).with_light_filter(LightFilter::D65),
        vec![SettingField::Specular, SettingField::LightFilter]
    )]
    #[case(settings(), vec![])]
    fn changed_fields_reports_only_differences(
        #[case] next: InstrumentSettings,
        #[case] expected: Vec<SettingField>,
    ) {
        assert_eq!(expected, next.changed_fields(&settings()));
    }

    #[test]
    fn apply_overwrites_reported_fields_only() {
        let mut snapshot = settings();
        snapshot.apply(&SettingsUpdate::default().with_specular(SpecularMode::Excluded));

        assert_eq!(SpecularMode::Excluded, snapshot.specular());
        assert_eq!(Aperture::Large, snapshot.aperture());
    }

    #[test]
    fn load_reads_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        writeln!(
            file,
            r#"
aperture = "small"
light_filter = "uv-excluded"

[connection]
port = "/dev/ttyUSB1"
flow_control = "rts-cts"
response_timeout = "20s"
"#
        )
        .expect("settings should be written");

        let loaded = InstrumentSettings::load(file.path()).expect("settings should load");

        assert_eq!(Aperture::Small, loaded.aperture());
        assert_eq!(LightFilter::UvExcluded, loaded.light_filter());
        assert_eq!(SpecularMode::Included, loaded.specular());
        assert_eq!("/dev/ttyUSB1", loaded.connection().port());
        assert_eq!(FlowControl::RtsCts, loaded.connection().flow_control());
        assert_eq!(
            Some(Duration::from_secs(20)),
            loaded.connection().response_timeout()
        );
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "aperture = 12").expect("settings should be written");

        let result = InstrumentSettings::load(file.path());

        assert_matches!(result, Err(SettingsError::Parse { path, .. }) if path == file.path());
    }
}
