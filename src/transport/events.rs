use tokio::sync::mpsc;

/// Notifications a transport raises towards its session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportEvent {
    Sending,
    Sent,
    /// Bytes received since the previous event.
    DataReceived(Vec<u8>),
    /// The transport gave up waiting for the instrument.
    Timeout,
}

/// Sending half of a session's transport event channel.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    sender: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEvents {
    /// Creates a connected sender/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Delivers an event. Returns `false` once the session stopped listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
