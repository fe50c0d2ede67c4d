use std::fmt::{self, Debug, Formatter};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{Transport, TransportEvent, TransportEvents};
use crate::error::TransportError;
use crate::settings::ConnectionConfig;
use crate::utils::format_frame;

/// How a [`FakeInstrument`] answers one request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reply {
    Respond(Vec<u8>),
    /// Delivers the response as separate `DataReceived` events.
    RespondInChunks(Vec<Vec<u8>>),
    Silent,
}

type Responder = Box<dyn FnMut(&[u8]) -> Reply + Send>;

struct FakeState {
    responder: Responder,
    sent: Vec<Vec<u8>>,
    silent_remaining: usize,
    powered: bool,
    open: bool,
    events: Option<TransportEvents>,
}

/// Scripted instrument behind a [`FakeTransport`].
///
/// The handle is shared: tests keep one clone to inspect traffic and inject
/// bytes while the session owns the transport.
#[derive(Clone)]
pub struct FakeInstrument {
    state: Arc<Mutex<FakeState>>,
}

impl FakeInstrument {
    /// Creates an instrument that answers each request frame via `responder`.
    #[must_use]
    pub fn new(responder: impl FnMut(&[u8]) -> Reply + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                responder: Box::new(responder),
                sent: Vec::new(),
                silent_remaining: 0,
                powered: true,
                open: false,
                events: None,
            })),
        }
    }

    /// Creates an instrument that never answers.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_request| Reply::Silent)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a transport wired to this instrument.
    #[must_use]
    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            instrument: self.clone(),
        }
    }

    /// Every frame sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Sent frames as trimmed text, for readable assertions.
    #[must_use]
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).trim().to_owned())
            .collect()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Ignores the next `requests` frames, as a power-cycling instrument would.
    pub fn go_silent_for(&self, requests: usize) {
        self.lock().silent_remaining = requests;
    }

    /// Powered-off instruments refuse `open` and never answer.
    pub fn set_powered(&self, powered: bool) {
        self.lock().powered = powered;
    }

    /// Pushes unsolicited bytes to the session. Returns `false` when closed.
    pub fn inject(&self, bytes: &[u8]) -> bool {
        self.emit(TransportEvent::DataReceived(bytes.to_vec()))
    }

    /// Raises a transport-side timeout. Returns `false` when closed.
    pub fn inject_timeout(&self) -> bool {
        self.emit(TransportEvent::Timeout)
    }

    fn emit(&self, event: TransportEvent) -> bool {
        let events = {
            let state = self.lock();
            if !state.open {
                return false;
            }
            state.events.clone()
        };
        events.is_some_and(|events| events.emit(event))
    }
}

impl Debug for FakeInstrument {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeInstrument")
            .field("sent", &state.sent.len())
            .field("silent_remaining", &state.silent_remaining)
            .field("powered", &state.powered)
            .field("open", &state.open)
            .finish_non_exhaustive()
    }
}

/// In-memory [`Transport`] answering from a [`FakeInstrument`].
#[derive(Debug)]
pub struct FakeTransport {
    instrument: FakeInstrument,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(
        &mut self,
        config: &ConnectionConfig,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        let mut state = self.instrument.lock();
        if !state.powered {
            return Err(TransportError::Open {
                port: config.port().to_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "instrument is powered off"),
            });
        }
        state.open = true;
        state.events = Some(events);
        debug!(port = config.port(), "fake instrument connected");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.instrument.lock();
        state.open = false;
        state.events = None;
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let (events, reply) = {
            let mut state = self.instrument.lock();
            let Some(events) = state.events.clone().filter(|_| state.open) else {
                return Err(TransportError::NotOpen);
            };
            events.emit(TransportEvent::Sending);
            state.sent.push(bytes.to_vec());
            events.emit(TransportEvent::Sent);

            let reply = if !state.powered {
                Reply::Silent
            } else if state.silent_remaining > 0 {
                state.silent_remaining -= 1;
                Reply::Silent
            } else {
                (state.responder)(bytes)
            };
            (events, reply)
        };

        trace!(frame = %format_frame(bytes), ?reply, "fake instrument replying");
        match reply {
            Reply::Respond(response) => {
                events.emit(TransportEvent::DataReceived(response));
            }
            Reply::RespondInChunks(chunks) => {
                for chunk in chunks {
                    events.emit(TransportEvent::DataReceived(chunk));
                }
            }
            Reply::Silent => {}
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.instrument.is_open()
    }
}
