mod engine;
mod listener;
mod state;
mod timer;

pub use self::engine::{InstrumentSession, SessionOptions};
pub use self::listener::{
    CalibratedEvent, ChannelListener, InstrumentEvent, InstrumentListener, ListenerId,
    MeasuredEvent, OperationalStatusEvent, SettingsChangedEvent,
};
pub use self::state::SessionState;
