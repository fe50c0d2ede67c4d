//! Byte-level connection to an instrument.

mod events;
mod fake;
mod serial;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::settings::ConnectionConfig;

pub use self::events::{TransportEvent, TransportEvents};
pub use self::fake::{FakeInstrument, FakeTransport, Reply};
pub use self::serial::SerialTransport;

/// Capability a session drives to talk to one instrument.
///
/// A transport is owned by exactly one session. Received bytes and other
/// notifications are pushed through the [`TransportEvents`] handed over in
/// [`Transport::open`]; the transport never interprets them.
#[async_trait]
pub trait Transport: Send + Debug {
    /// Opens the connection and starts delivering events.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] when the port cannot be opened.
    async fn open(
        &mut self,
        config: &ConnectionConfig,
        events: TransportEvents,
    ) -> Result<(), TransportError>;

    /// Closes the connection. Closing a closed transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying port fails to shut down cleanly.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Writes one request frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotOpen`] before `open` and
    /// [`TransportError::Io`] when the write fails.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;
}
