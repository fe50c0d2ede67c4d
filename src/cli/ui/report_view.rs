use std::fmt::{self, Display, Formatter};

use crate::cli::report::RunReport;
use crate::command::{InstrumentStatus, SpectralReading};
use crate::session::InstrumentEvent;
use crate::settings::InstrumentSettings;

use super::painter::Painter;
use super::table::Table;

/// Renders a command run for a terminal.
pub(crate) struct ReportView<'a> {
    report: &'a RunReport,
    painter: &'a Painter,
}

impl<'a> ReportView<'a> {
    pub(crate) fn new(report: &'a RunReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn instrument_table(&self) -> Table {
        let serial_number = match self.report.serial_number() {
            Some(serial_number) => self.painter.value(serial_number),
            None => self.painter.warning("<unknown>"),
        };
        Table::key_value(
            self.painter,
            vec![
                ("model", self.painter.value(self.report.model().to_string())),
                ("port", self.painter.value(self.report.port())),
                ("serial_number", serial_number),
            ],
        )
    }

    fn settings_table(&self, settings: &InstrumentSettings) -> Table {
        Table::key_value(
            self.painter,
            vec![
                ("aperture", self.painter.value(settings.aperture().to_string())),
                ("specular", self.painter.value(settings.specular().to_string())),
                (
                    "light_filter",
                    self.painter.value(settings.light_filter().to_string()),
                ),
                (
                    "lens_position",
                    self.painter.value(settings.lens_position().to_string()),
                ),
            ],
        )
    }

    fn events_table(&self) -> Table {
        let rows = self
            .report
            .events()
            .iter()
            .enumerate()
            .map(|(index, event)| {
                let status = event.status();
                vec![
                    self.painter.muted((index + 1).to_string()),
                    event_name(event).to_string(),
                    self.painter
                        .severity(status.severity(), status.severity().to_string()),
                    event_detail(event),
                ]
            })
            .collect();
        Table::grid(["#", "event", "severity", "detail"], rows).with_numeric_columns([0])
    }
}

impl Display for ReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.heading("Instrument:"))?;
        write!(f, "\n{}", self.instrument_table())?;

        if let Some(settings) = self.report.settings() {
            write!(f, "\n\n{}", self.painter.heading("Settings:"))?;
            write!(f, "\n{}", self.settings_table(settings))?;
        }

        if self.report.events().is_empty() {
            return write!(f, "\n\n{}", self.painter.muted("No instrument events."));
        }
        write!(f, "\n\n{}", self.painter.heading("Events:"))?;
        write!(f, "\n{}", self.events_table())?;

        let readings = self.report.events().iter().filter_map(|event| match event {
            InstrumentEvent::Measured(measured) => measured.measurement().reading(),
            _ => None,
        });
        for (index, reading) in readings.enumerate() {
            write!(
                f,
                "\n\n{}",
                self.painter.heading(format!("Reading {}:", index + 1))
            )?;
            write!(f, "\n{}", reading_table(reading))?;
        }
        Ok(())
    }
}

fn event_name(event: &InstrumentEvent) -> &'static str {
    match event {
        InstrumentEvent::Measured(_event) => "measured",
        InstrumentEvent::Calibrated(_event) => "calibrated",
        InstrumentEvent::SettingsChanged(_event) => "settings_changed",
        InstrumentEvent::OperationalStatusChanged(_event) => "status",
    }
}

fn event_detail(event: &InstrumentEvent) -> String {
    let summary = match event {
        InstrumentEvent::Measured(measured) => measured
            .measurement()
            .reading()
            .and_then(reading_summary),
        InstrumentEvent::Calibrated(calibrated) => Some(format!("{} step", calibrated.step())),
        InstrumentEvent::SettingsChanged(_event) => None,
        InstrumentEvent::OperationalStatusChanged(status) => status
            .serial_number()
            .map(|serial_number| format!("serial {serial_number}")),
    };
    let status = status_detail(event.status());
    match (summary, status.is_empty()) {
        (Some(summary), true) => summary,
        (Some(summary), false) => format!("{summary}; {status}"),
        (None, _) => status,
    }
}

fn reading_summary(reading: &SpectralReading) -> Option<String> {
    Some(format!(
        "{}-{} nm, {} samples",
        reading.start()?,
        reading.end()?,
        reading.len()
    ))
}

/// Code, messages and errors of a status on one line.
fn status_detail(status: &InstrumentStatus) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(code) = status.code() {
        parts.push(format!("code {code}"));
    }
    parts.extend(status.messages().iter().cloned());
    parts.extend(status.errors().iter().cloned());
    parts.join("; ")
}

fn reading_table(reading: &SpectralReading) -> Table {
    let rows = reading
        .iter()
        .map(|(wavelength, value)| vec![wavelength.to_string(), format!("{value:.4}")])
        .collect();
    Table::grid(["nm", "reflectance"], rows).with_numeric_columns([0, 1])
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::command::{FaultKind, Severity};

    #[test]
    fn status_detail_joins_code_messages_and_errors() {
        let status = InstrumentStatus::from_code(Severity::Warning, 12, "calibration due");
        assert_eq!("code 12; calibration due", status_detail(&status));

        let fault = InstrumentStatus::fault(FaultKind::Timeout, "no response");
        assert_eq!("no response", status_detail(&fault));
        assert_eq!("", status_detail(&InstrumentStatus::success()));
    }

    #[test]
    fn reading_table_lists_every_wavelength() {
        let reading = SpectralReading::from_uniform(400, 10, [0.25, 0.5]);

        assert_snapshot!(reading_table(&reading).to_string(), @r"
        ╭─────┬─────────────╮
        │ nm  │ reflectance │
        ├─────┼─────────────┤
        │ 400 │      0.2500 │
        │ 410 │      0.5000 │
        ╰─────┴─────────────╯
        ");
    }

    #[test]
    fn reading_summary_reports_the_range() {
        let reading = SpectralReading::from_uniform(400, 20, [0.1, 0.2, 0.3]);
        assert_eq!(
            Some("400-440 nm, 3 samples".to_string()),
            reading_summary(&reading)
        );
        assert_eq!(None, reading_summary(&SpectralReading::default()));
    }
}
