//! Command-queue and response-protocol engine for serial spectrophotometers.
//!
//! An [`InstrumentSession`] owns one [`Transport`] and one [`InstrumentDriver`].
//! Requests are queued without blocking, sent one at a time, matched to their
//! responses and reported to [`InstrumentListener`]s.

mod app;
mod cli;
mod command;
mod drivers;
mod error;
mod queue;
mod session;
mod settings;
mod telemetry;
mod terminal;
mod transport;
mod utils;

pub use app::{fake_transport, run, run_with_clients, run_with_log_level, serial_transport};
pub use cli::{
    Args, CalibrateArgs, Command as CliCommand, FakeArgs, InstrumentTarget, LogLevel,
    MeasureArgs, OutputFormat, SettingsArgs,
};
pub use command::{
    BoxedCommand, CalibrationStep, Command, Decoded, FaultKind, InstrumentStatus, Line,
    Measurement, Outcome, Severity, SpectralReading, Terminator,
};
pub use drivers::{
    ColorEye, DEFAULT_RESPONSE_TIMEOUT, DriverModel, InstrumentDriver, MinoltaCm, XriteSp,
};
pub use error::{SessionError, SettingsError, TransportError};
pub use queue::{Capacity, Fifo, FifoError};
pub use session::{
    CalibratedEvent, ChannelListener, InstrumentEvent, InstrumentListener, InstrumentSession,
    ListenerId, MeasuredEvent, OperationalStatusEvent, SessionOptions, SessionState,
    SettingsChangedEvent,
};
pub use settings::{
    Aperture, ConnectionConfig, FlowControl, InstrumentSettings, LensPosition, LightFilter,
    SettingField, SettingsUpdate, SpecularMode,
};
pub use terminal::{SystemTerminalClient, TerminalClient};
pub use transport::{
    FakeInstrument, FakeTransport, Reply, SerialTransport, Transport, TransportEvent,
    TransportEvents,
};
