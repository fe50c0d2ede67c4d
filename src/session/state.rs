use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use strum_macros::Display;

use crate::command::BoxedCommand;
use crate::settings::{InstrumentSettings, SettingField};

/// Lifecycle of an instrument session.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Created, transport not opened yet.
    #[default]
    Uninitialized,
    /// Opening the transport.
    AwaitingConnection,
    /// Connected with nothing in flight.
    Idle,
    /// A command is being written.
    Sending,
    /// A command was sent and its response window is armed.
    AwaitingResponse,
    /// A response window expired and a probe is in flight.
    Recovering,
    Disposed,
}

/// Fields shared by the worker, the notification task and callers.
/// Always accessed through the session's single core lock.
#[derive(Debug, Default)]
pub(crate) struct SessionCore {
    pub(crate) state: SessionState,
    /// Last settings a caller asked for; the base for diffing.
    pub(crate) requested: Option<InstrumentSettings>,
    /// Settings as confirmed by the instrument.
    pub(crate) snapshot: Option<InstrumentSettings>,
    pub(crate) serial_number: Option<String>,
    /// The command displaced by a recovery probe. Present only while recovering.
    pub(crate) saved: Option<BoxedCommand>,
    /// Set once the in-flight command has been through a recovery probe.
    /// A second missed window for the same command abandons it.
    pub(crate) recovered: bool,
    /// Settings the instrument refused or never answered for. Resent by the
    /// next settings application even when the requested value is unchanged.
    pub(crate) unconfirmed: HashSet<SettingField>,
    pub(crate) buffer: Vec<u8>,
    pub(crate) response_timeout: Duration,
}

impl SessionCore {
    pub(crate) fn is_recovering(&self) -> bool {
        self.saved.is_some()
    }

    /// Moves to `next` unless the session has been disposed.
    pub(crate) fn transition(&mut self, next: SessionState) {
        if self.state != SessionState::Disposed && self.state != next {
            tracing::trace!(from = %self.state, to = %next, "session state change");
            self.state = next;
        }
    }
}
