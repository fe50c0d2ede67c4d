use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use derive_more::Display;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::command::{CalibrationStep, InstrumentStatus, Measurement};
use crate::settings::InstrumentSettings;

/// A measurement response was decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasuredEvent {
    #[serde(flatten)]
    measurement: Measurement,
}

impl MeasuredEvent {
    pub(crate) fn new(measurement: Measurement) -> Self {
        Self { measurement }
    }

    #[must_use]
    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        self.measurement.status()
    }
}

/// A calibration step finished, successfully or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibratedEvent {
    step: CalibrationStep,
    status: InstrumentStatus,
}

impl CalibratedEvent {
    pub(crate) fn new(step: CalibrationStep, status: InstrumentStatus) -> Self {
        Self { step, status }
    }

    #[must_use]
    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        &self.status
    }
}

/// The instrument confirmed a settings change. Carries the full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsChangedEvent {
    settings: InstrumentSettings,
    status: InstrumentStatus,
}

impl SettingsChangedEvent {
    pub(crate) fn new(settings: InstrumentSettings, status: InstrumentStatus) -> Self {
        Self { settings, status }
    }

    #[must_use]
    pub fn settings(&self) -> &InstrumentSettings {
        &self.settings
    }

    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        &self.status
    }
}

/// Informational status, identification, or a fault such as a timeout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationalStatusEvent {
    status: InstrumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
}

impl OperationalStatusEvent {
    pub(crate) fn new(status: InstrumentStatus, serial_number: Option<String>) -> Self {
        Self {
            status,
            serial_number,
        }
    }

    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        &self.status
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }
}

/// Every event a session fans out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InstrumentEvent {
    Measured(MeasuredEvent),
    Calibrated(CalibratedEvent),
    SettingsChanged(SettingsChangedEvent),
    OperationalStatusChanged(OperationalStatusEvent),
}

impl InstrumentEvent {
    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        match self {
            Self::Measured(event) => event.status(),
            Self::Calibrated(event) => event.status(),
            Self::SettingsChanged(event) => event.status(),
            Self::OperationalStatusChanged(event) => event.status(),
        }
    }
}

/// Receives session events.
///
/// Callbacks run on the session's notification task. They must return
/// quickly and must not call back into the session while running.
pub trait InstrumentListener: Send + Sync {
    fn measured(&self, _event: &MeasuredEvent) {}

    fn calibrated(&self, _event: &CalibratedEvent) {}

    fn settings_changed(&self, _event: &SettingsChangedEvent) {}

    fn operational_status_changed(&self, _event: &OperationalStatusEvent) {}
}

/// Forwards every event into an unbounded channel.
#[derive(Debug)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<InstrumentEvent>,
}

impl ChannelListener {
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<InstrumentEvent>) -> Self {
        Self { sender }
    }

    fn forward(&self, event: InstrumentEvent) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.sender.send(event);
    }
}

impl InstrumentListener for ChannelListener {
    fn measured(&self, event: &MeasuredEvent) {
        self.forward(InstrumentEvent::Measured(event.clone()));
    }

    fn calibrated(&self, event: &CalibratedEvent) {
        self.forward(InstrumentEvent::Calibrated(event.clone()));
    }

    fn settings_changed(&self, event: &SettingsChangedEvent) {
        self.forward(InstrumentEvent::SettingsChanged(event.clone()));
    }

    fn operational_status_changed(&self, event: &OperationalStatusEvent) {
        self.forward(InstrumentEvent::OperationalStatusChanged(event.clone()));
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[display("listener-{_0}")]
pub struct ListenerId(u64);

type Entry = (ListenerId, Arc<dyn InstrumentListener>);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn InstrumentListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        debug!(%id, "listener registered");
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(candidate, _listener)| *candidate != id);
        let removed = entries.len() != before;
        if removed {
            debug!(%id, "listener removed");
        }
        removed
    }

    pub(crate) fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Calls every registered listener without holding the registry lock, so
    /// callbacks may register or remove listeners.
    pub(crate) fn dispatch(&self, event: &InstrumentEvent) {
        let snapshot: Vec<Arc<dyn InstrumentListener>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_id, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            match event {
                InstrumentEvent::Measured(event) => listener.measured(event),
                InstrumentEvent::Calibrated(event) => listener.calibrated(event),
                InstrumentEvent::SettingsChanged(event) => listener.settings_changed(event),
                InstrumentEvent::OperationalStatusChanged(event) => {
                    listener.operational_status_changed(event);
                }
            }
        }
    }
}
