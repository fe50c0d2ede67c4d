mod connection;
mod instrument;

pub use self::connection::{ConnectionConfig, FlowControl};
pub use self::instrument::{
    Aperture, InstrumentSettings, LensPosition, LightFilter, SettingField, SettingsUpdate,
    SpecularMode,
};
