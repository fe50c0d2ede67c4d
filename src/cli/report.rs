use serde::Serialize;

use crate::drivers::DriverModel;
use crate::session::InstrumentEvent;
use crate::settings::InstrumentSettings;

/// Everything a command run observed, in the order it happened.
#[derive(Debug, Serialize)]
pub(crate) struct RunReport {
    command: &'static str,
    model: DriverModel,
    port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<InstrumentSettings>,
    events: Vec<InstrumentEvent>,
}

impl RunReport {
    pub(crate) fn new(
        command: &'static str,
        model: DriverModel,
        port: String,
        serial_number: Option<String>,
        settings: Option<InstrumentSettings>,
        events: Vec<InstrumentEvent>,
    ) -> Self {
        Self {
            command,
            model,
            port,
            serial_number,
            settings,
            events,
        }
    }

    pub(crate) fn model(&self) -> DriverModel {
        self.model
    }

    pub(crate) fn port(&self) -> &str {
        &self.port
    }

    pub(crate) fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub(crate) fn settings(&self) -> Option<&InstrumentSettings> {
        self.settings.as_ref()
    }

    pub(crate) fn events(&self) -> &[InstrumentEvent] {
        &self.events
    }

    pub(crate) fn error_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| event.status().is_error())
            .count()
    }
}
