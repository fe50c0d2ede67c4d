use clap::Args;

use crate::settings::{Aperture, InstrumentSettings, LensPosition, LightFilter, SpecularMode};

/// Arguments for the `settings` command. Omitted values keep the configured ones.
#[derive(Debug, Default, Args)]
pub struct SettingsArgs {
    /// `large`, `medium`, `small` or `ultra-small`.
    #[arg(long)]
    aperture: Option<Aperture>,
    /// `included` or `excluded`.
    #[arg(long)]
    specular: Option<SpecularMode>,
    /// `none`, `uv-included`, `uv-excluded` or `d65`.
    #[arg(long)]
    light_filter: Option<LightFilter>,
    /// `large` or `small`.
    #[arg(long)]
    lens_position: Option<LensPosition>,
}

impl SettingsArgs {
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

    pub(crate) fn apply(&self, mut settings: InstrumentSettings) -> InstrumentSettings {
        if let Some(aperture) = self.aperture {
            settings = settings.with_aperture(aperture);
        }
        if let Some(specular) = self.specular {
            settings = settings.with_specular(specular);
        }
        if let Some(light_filter) = self.light_filter {
            settings = settings.with_light_filter(light_filter);
        }
        if let Some(lens_position) = self.lens_position {
            settings = settings.with_lens_position(lens_position);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::settings::ConnectionConfig;

    #[test]
    fn only_given_values_are_overridden() {
        let configured = InstrumentSettings::builder()
            .connection(ConnectionConfig::builder().port("COM3").build())
            .light_filter(LightFilter::D65)
            .build();

        let applied = SettingsArgs::default()
            .with_aperture(Aperture::Small)
            .apply(configured.clone());

        assert_eq!(Aperture::Small, applied.aperture());
        assert_eq!(LightFilter::D65, applied.light_filter());
        assert_eq!(configured.specular(), applied.specular());
    }
}
