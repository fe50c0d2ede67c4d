use std::fmt::{self, Debug, Formatter};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::{Transport, TransportEvent, TransportEvents};
use crate::error::TransportError;
use crate::settings::{ConnectionConfig, FlowControl};
use crate::utils::format_frame;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_CHUNK_SIZE: usize = 256;

/// RS-232 transport on top of the `serialport` crate.
///
/// Blocking port I/O runs on tokio's blocking pool: one long-lived reader
/// forwards received chunks, and each send borrows the writer handle.
#[derive(Default)]
pub struct SerialTransport {
    connection: Option<OpenPort>,
}

struct OpenPort {
    name: String,
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    events: TransportEvents,
    reader: JoinHandle<()>,
    stop: CancellationToken,
}

impl SerialTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Debug for SerialTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.connection.as_ref().map(|open| &open.name))
            .finish()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(open) = &self.connection {
            open.stop.cancel();
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => Self::None,
            FlowControl::RtsCts => Self::Hardware,
            FlowControl::XonXoff => Self::Software,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    #[instrument(skip(self, config, events), level = "debug", fields(port = %config.port()))]
    async fn open(
        &mut self,
        config: &ConnectionConfig,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        if self.connection.is_some() {
            self.close().await?;
        }

        let name = config.port().to_owned();
        let builder = serialport::new(name.clone(), config.baud_rate())
            .flow_control(config.flow_control().into())
            .timeout(READ_POLL_INTERVAL);
        let open_error = |source: io::Error| TransportError::Open {
            port: name.clone(),
            source,
        };

        let port = tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|join_error| open_error(io::Error::other(join_error)))?
            .map_err(|error| open_error(error.into()))?;
        let reader_port = port
            .try_clone()
            .map_err(|error| open_error(error.into()))?;

        let stop = CancellationToken::new();
        let reader = tokio::task::spawn_blocking({
            let events = events.clone();
            let stop = stop.clone();
            move || read_until_stopped(reader_port, &events, &stop)
        });
        debug!(baud_rate = config.baud_rate(), "serial port opened");

        self.connection = Some(OpenPort {
            name,
            writer: Arc::new(Mutex::new(port)),
            events,
            reader,
            stop,
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(open) = self.connection.take() else {
            return Ok(());
        };
        open.stop.cancel();
        if let Err(error) = open.reader.await {
            warn!(%error, port = %open.name, "serial reader ended abnormally");
        }
        debug!(port = %open.name, "serial port closed");
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let open = self.connection.as_ref().ok_or(TransportError::NotOpen)?;
        trace!(frame = %format_frame(bytes), "writing frame");
        open.events.emit(TransportEvent::Sending);

        let writer = Arc::clone(&open.writer);
        let frame = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut port = writer.blocking_lock();
            port.write_all(&frame)?;
            port.flush()
        })
        .await
        .map_err(io::Error::other)??;

        open.events.emit(TransportEvent::Sent);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }
}

fn read_until_stopped(
    mut port: Box<dyn SerialPort>,
    events: &TransportEvents,
    stop: &CancellationToken,
) {
    let mut chunk = [0_u8; READ_CHUNK_SIZE];
    while !stop.is_cancelled() {
        match port.read(&mut chunk) {
            Ok(0) => {}
            Ok(read) => {
                trace!(frame = %format_frame(&chunk[..read]), "received chunk");
                if !events.emit(TransportEvent::DataReceived(chunk[..read].to_vec())) {
                    break;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::TimedOut => {}
            Err(error) => {
                warn!(%error, "serial read failed, reader stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn flow_control_maps_onto_serialport_modes() {
        assert_eq!(
            serialport::FlowControl::Hardware,
            serialport::FlowControl::from(FlowControl::RtsCts)
        );
        assert_eq!(
            serialport::FlowControl::Software,
            serialport::FlowControl::from(FlowControl::XonXoff)
        );
        assert_eq!(
            serialport::FlowControl::None,
            serialport::FlowControl::from(FlowControl::None)
        );
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        let mut transport = SerialTransport::new();

        let result = transport.send(b"SN\r\n").await;

        assert_matches!(result, Err(TransportError::NotOpen));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn open_reports_missing_port() {
        let mut transport = SerialTransport::new();
        let config = ConnectionConfig::builder()
            .port("/dev/spectro-test-port-that-does-not-exist")
            .build();
        let (events, _receiver) = TransportEvents::channel();

        let result = transport.open(&config, events).await;

        assert_matches!(result, Err(TransportError::Open { port, .. }) if port.ends_with("does-not-exist"));
        assert!(!transport.is_open());
    }
}
