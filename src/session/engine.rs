use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use strum::IntoEnumIterator;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::listener::{
    CalibratedEvent, ChannelListener, InstrumentEvent, InstrumentListener, ListenerId, Listeners,
    MeasuredEvent, OperationalStatusEvent, SettingsChangedEvent,
};
use super::state::{SessionCore, SessionState};
use super::timer::ResponseTimer;
use crate::command::{
    BoxedCommand, CalibrationStep, Command, Decoded, FaultKind, InstrumentStatus, Outcome,
};
use crate::drivers::{DriverModel, InstrumentDriver};
use crate::error::SessionError;
use crate::queue::{Capacity, Fifo, FifoError};
use crate::settings::{InstrumentSettings, SettingField};
use crate::transport::{Transport, TransportEvent, TransportEvents};
use crate::utils::format_frame;

const DEFAULT_OUTGOING_CAPACITY: usize = 5;
/// At most one command awaits a response at any time.
const INCOMING_CAPACITY: usize = 1;

/// Tuning knobs for an [`InstrumentSession`].
#[derive(Debug, Clone, Builder)]
pub struct SessionOptions {
    #[builder(default = Capacity::Bounded(DEFAULT_OUTGOING_CAPACITY))]
    outgoing_capacity: Capacity,
    /// Overrides both the driver's and the connection's response window.
    response_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Protocol engine driving one instrument over one transport.
///
/// Callers queue work with [`measure`](Self::measure),
/// [`calibrate`](Self::calibrate) and [`apply_settings`](Self::apply_settings);
/// none of them wait for the instrument. A worker task sends queued commands
/// one at a time, and a notification task matches responses to the command in
/// flight and fans results out to listeners.
///
/// When a response window expires the session sends the driver's probe
/// command. If the probe is answered, the original command is sent again; if
/// the probe also times out, the command is dropped and listeners receive a
/// single timeout status.
pub struct InstrumentSession {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    tasks: Mutex<Option<Tasks>>,
    apply_lock: AsyncMutex<()>,
}

struct Tasks {
    worker: JoinHandle<()>,
    notifier: JoinHandle<()>,
}

struct Shared {
    driver: Arc<dyn InstrumentDriver>,
    outgoing: Fifo<BoxedCommand>,
    incoming: Fifo<BoxedCommand>,
    transport: AsyncMutex<Box<dyn Transport>>,
    core: Mutex<SessionCore>,
    listeners: Listeners,
    timer: ResponseTimer,
    response_timeout_override: Option<Duration>,
    pending: AtomicUsize,
    settled: Notify,
}

struct Outbound {
    name: &'static str,
    frame: Vec<u8>,
}

impl Outbound {
    fn of(command: &dyn Command) -> Self {
        Self {
            name: command.name(),
            frame: command.encode(),
        }
    }
}

enum Absorbed {
    Nothing,
    Unsolicited(InstrumentEvent),
    Completed(Option<InstrumentEvent>),
    Resume(Outbound),
}

enum Escalation {
    Ignored,
    Probe(Outbound),
    Abandoned(InstrumentEvent),
}

impl InstrumentSession {
    #[must_use]
    pub fn new(driver: Arc<dyn InstrumentDriver>, transport: Box<dyn Transport>) -> Self {
        Self::with_options(driver, transport, SessionOptions::default())
    }

    #[must_use]
    pub fn with_options(
        driver: Arc<dyn InstrumentDriver>,
        transport: Box<dyn Transport>,
        options: SessionOptions,
    ) -> Self {
        let shared = Shared {
            driver,
            outgoing: Fifo::new(options.outgoing_capacity),
            incoming: Fifo::bounded(INCOMING_CAPACITY),
            transport: AsyncMutex::new(transport),
            core: Mutex::new(SessionCore::default()),
            listeners: Listeners::default(),
            timer: ResponseTimer::new(),
            response_timeout_override: options.response_timeout,
            pending: AtomicUsize::new(0),
            settled: Notify::new(),
        };
        Self {
            shared: Arc::new(shared),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(None),
            apply_lock: AsyncMutex::new(()),
        }
    }

    #[must_use]
    pub fn model(&self) -> DriverModel {
        self.shared.driver.model()
    }

    /// Applies instrument settings.
    ///
    /// The first call opens the transport with the embedded connection
    /// parameters, starts the session tasks and queues the driver's connect
    /// commands followed by every supported setting. Later calls queue the
    /// settings that differ from the previous request, plus any setting the
    /// instrument refused or never answered; connection changes on an open
    /// session are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportOpen`] when the connection cannot be
    /// opened (the call may be retried), [`SessionError::Busy`] when the
    /// commands do not fit in the queue (checked before a first call opens
    /// anything), and [`SessionError::Disposed`] after
    /// [`dispose`](Self::dispose).
    #[instrument(
        skip(self, settings),
        level = "info",
        fields(model = %self.model(), port = %settings.connection().port())
    )]
    pub async fn apply_settings(&self, settings: InstrumentSettings) -> Result<(), SessionError> {
        let _serialised = self.apply_lock.lock().await;
        let (state, previous) = {
            let core = self.shared.core();
            (core.state, core.requested.clone())
        };
        match state {
            SessionState::Disposed => return Err(SessionError::Disposed),
            SessionState::Uninitialized | SessionState::AwaitingConnection => {
                return self.connect(settings).await;
            }
            SessionState::Idle
            | SessionState::Sending
            | SessionState::AwaitingResponse
            | SessionState::Recovering => {}
        }

        if let Some(previous) = &previous
            && previous.connection() != settings.connection()
        {
            warn!("connection parameters cannot change on an open session; keeping the current connection");
        }
        let mut commands = self
            .shared
            .driver
            .settings_commands(previous.as_ref(), &settings);
        let resent = self.shared.take_unconfirmed();
        let queued: Vec<SettingField> = commands
            .iter()
            .filter_map(|command| command.setting())
            .collect();
        commands.extend(
            resent
                .iter()
                .copied()
                .filter(|field| !queued.contains(field))
                .filter_map(|field| self.shared.driver.setting_command(field, &settings)),
        );
        debug!(
            commands = commands.len(),
            resent = resent.len(),
            "queueing settings changes"
        );
        if let Err(error) = self.shared.enqueue(commands) {
            self.shared.core().unconfirmed.extend(resent);
            return Err(error);
        }
        self.shared.core().requested = Some(settings);
        Ok(())
    }

    async fn connect(&self, settings: InstrumentSettings) -> Result<(), SessionError> {
        let mut commands = self.shared.driver.connect_commands();
        commands.extend(self.shared.driver.settings_commands(None, &settings));
        if let Err(error) = self.shared.outgoing.check_vacancy(commands.len()) {
            warn!(
                commands = commands.len(),
                capacity = ?self.shared.outgoing.capacity(),
                "connect sequence does not fit in the command queue"
            );
            return Err(error.into());
        }

        self.shared
            .core()
            .transition(SessionState::AwaitingConnection);
        let (events, receiver) = TransportEvents::channel();
        let opened = self
            .shared
            .transport
            .lock()
            .await
            .open(settings.connection(), events)
            .await;
        if let Err(error) = opened {
            warn!(%error, "failed to open instrument connection");
            self.shared.core().transition(SessionState::Uninitialized);
            return Err(SessionError::TransportOpen(error));
        }

        let window = self
            .shared
            .response_timeout_override
            .or(settings.connection().response_timeout())
            .unwrap_or_else(|| self.shared.driver.response_timeout());
        let disposed = {
            let mut core = self.shared.core();
            core.response_timeout = window;
            core.snapshot = Some(settings.clone());
            core.unconfirmed.clear();
            core.transition(SessionState::Idle);
            core.state == SessionState::Disposed
        };
        if disposed {
            self.shared.close_transport().await;
            return Err(SessionError::Disposed);
        }

        self.spawn_tasks(receiver);
        info!(
            response_timeout = %humantime::format_duration(window),
            "instrument connection open"
        );

        self.shared.enqueue(commands)?;
        self.shared.core().requested = Some(settings);
        Ok(())
    }

    fn spawn_tasks(&self, events: mpsc::UnboundedReceiver<TransportEvent>) {
        let expiries = self.shared.timer.attach();
        let worker = tokio::spawn(run_worker(Arc::clone(&self.shared), self.cancel.clone()));
        let notifier = tokio::spawn(run_notifications(
            Arc::clone(&self.shared),
            events,
            expiries,
            self.cancel.clone(),
        ));
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Tasks { worker, notifier });
    }

    /// Queues a measurement.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] when the queue is full,
    /// [`SessionError::NotConnected`] before settings were applied and
    /// [`SessionError::Disposed`] after disposal.
    pub fn measure(&self) -> Result<(), SessionError> {
        self.shared.ensure_connected()?;
        self.shared.enqueue(self.shared.driver.measure_commands())
    }

    /// Queues calibration step `step` (0 white, 1 black, 2 zero).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnsupportedCalibration`] for steps the model
    /// cannot perform, before any connection check, plus the errors of
    /// [`measure`](Self::measure).
    pub fn calibrate(&self, step: u8) -> Result<(), SessionError> {
        let commands = CalibrationStep::from_index(step)
            .and_then(|calibration| self.shared.driver.calibration_commands(calibration))
            .ok_or(SessionError::UnsupportedCalibration {
                step,
                model: self.model(),
            })?;
        self.shared.ensure_connected()?;
        self.shared.enqueue(commands)
    }

    /// Queues retrieval of a sample stored in instrument memory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnsupportedOperation`] when the model has no
    /// sample memory, plus the errors of [`measure`](Self::measure).
    pub fn retrieve_stored_sample(&self, index: u16) -> Result<(), SessionError> {
        let commands = self.shared.driver.stored_sample_commands(index).ok_or(
            SessionError::UnsupportedOperation {
                operation: "retrieve_stored_sample",
                model: self.model(),
            },
        )?;
        self.shared.ensure_connected()?;
        self.shared.enqueue(commands)
    }

    /// Stops the session and releases the transport.
    ///
    /// Pending waits are cancelled, the armed response window is dropped and
    /// both tasks are joined before the transport is closed. Close failures
    /// are logged. Later operations fail with [`SessionError::Disposed`].
    #[instrument(skip(self), level = "debug", fields(model = %self.model()))]
    pub async fn dispose(&self) {
        {
            let mut core = self.shared.core();
            if core.state == SessionState::Disposed {
                return;
            }
            core.state = SessionState::Disposed;
            core.saved = None;
            core.buffer.clear();
            core.requested = None;
            core.snapshot = None;
            core.serial_number = None;
        }
        self.cancel.cancel();
        self.shared.outgoing.close();
        self.shared.incoming.close();
        self.shared.timer.cancel();

        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Tasks { worker, notifier }) = tasks {
            for (task, handle) in [("worker", worker), ("notifier", notifier)] {
                if let Err(error) = handle.await {
                    warn!(task, %error, "session task ended abnormally");
                }
            }
        }

        self.shared.close_transport().await;
        self.shared.listeners.clear();
        self.shared.pending.store(0, Ordering::SeqCst);
        self.shared.settled.notify_waiters();
        debug!("session disposed");
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.core().state
    }

    /// Settings as last confirmed by the instrument.
    #[must_use]
    pub fn settings(&self) -> Option<InstrumentSettings> {
        self.shared.core().snapshot.clone()
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<String> {
        self.shared.core().serial_number.clone()
    }

    #[must_use]
    pub fn outgoing_len(&self) -> usize {
        self.shared.outgoing.len()
    }

    /// Name of the command awaiting a response, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&'static str> {
        self.shared.incoming.try_peek_with(|command| command.name())
    }

    #[must_use]
    pub fn is_recovering(&self) -> bool {
        self.shared.core().is_recovering()
    }

    /// Waits until every queued command has completed or been dropped.
    pub async fn settled(&self) {
        loop {
            let notified = self.shared.settled.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn InstrumentListener>) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Registers a listener that forwards every event into the returned stream.
    pub fn events(&self) -> UnboundedReceiverStream<InstrumentEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.add_listener(Arc::new(ChannelListener::new(sender)));
        UnboundedReceiverStream::new(receiver)
    }
}

impl Drop for InstrumentSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.shared.outgoing.close();
        self.shared.incoming.close();
        self.shared.timer.cancel();
    }
}

impl Debug for InstrumentSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("model", &self.model())
            .field("state", &self.state())
            .field("outgoing", &self.outgoing_len())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.core().state {
            SessionState::Uninitialized | SessionState::AwaitingConnection => {
                Err(SessionError::NotConnected)
            }
            SessionState::Disposed => Err(SessionError::Disposed),
            SessionState::Idle
            | SessionState::Sending
            | SessionState::AwaitingResponse
            | SessionState::Recovering => Ok(()),
        }
    }

    fn enqueue(&self, commands: Vec<BoxedCommand>) -> Result<(), SessionError> {
        let count = commands.len();
        self.pending.fetch_add(count, Ordering::SeqCst);
        if let Err(error) = self.outgoing.put_all(commands) {
            self.retire(count);
            return Err(error.into());
        }
        Ok(())
    }

    /// Drains the settings awaiting confirmation, in field order.
    fn take_unconfirmed(&self) -> Vec<SettingField> {
        let unconfirmed = std::mem::take(&mut self.core().unconfirmed);
        SettingField::iter()
            .filter(|field| unconfirmed.contains(field))
            .collect()
    }

    fn retire(&self, count: usize) {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                Some(pending.saturating_sub(count))
            })
            .unwrap_or_else(|pending| pending);
        if previous <= count {
            self.settled.notify_waiters();
        }
    }

    async fn close_transport(&self) {
        let mut transport = self.transport.lock().await;
        if transport.is_open()
            && let Err(error) = transport.close().await
        {
            warn!(%error, "failed to close instrument connection");
        }
    }

    async fn next_outgoing(&self) -> Result<BoxedCommand, FifoError> {
        self.incoming.wait_vacant().await?;
        self.outgoing.remove_next().await
    }

    /// Registers `command` as in flight, then sends it.
    async fn send_next(&self, command: BoxedCommand) {
        let outbound = Outbound::of(command.as_ref());
        {
            let mut core = self.core();
            if core.state == SessionState::Disposed {
                return;
            }
            core.buffer.clear();
            core.transition(SessionState::Sending);
        }
        if self.incoming.put(command).is_err() {
            return;
        }
        if self.transmit(outbound).await {
            let mut core = self.core();
            if core.state == SessionState::Sending {
                core.transition(SessionState::AwaitingResponse);
            }
        }
    }

    /// Arms the response window and writes the frame. A failed write drops
    /// the command in flight and reports a send fault.
    async fn transmit(&self, outbound: Outbound) -> bool {
        let window = self.core().response_timeout;
        self.timer.arm(window);
        debug!(
            command = outbound.name,
            frame = %format_frame(&outbound.frame),
            "sending command"
        );
        let sent = self.transport.lock().await.send(&outbound.frame).await;
        match sent {
            Ok(()) => true,
            Err(error) => {
                warn!(command = outbound.name, %error, "failed to send command");
                self.fail(InstrumentStatus::fault(
                    FaultKind::Send,
                    format!("failed to send `{}`: {error}", outbound.name),
                ));
                false
            }
        }
    }

    async fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Sending | TransportEvent::Sent => {
                trace!(?event, "transport progress");
            }
            TransportEvent::DataReceived(bytes) => self.on_data(&bytes).await,
            TransportEvent::Timeout => {
                if self.timer.cancel() {
                    self.on_timeout().await;
                } else {
                    debug!("ignoring transport timeout with no response window armed");
                }
            }
        }
    }

    async fn on_expiry(&self, generation: u64) {
        if self.timer.expire(generation) {
            self.on_timeout().await;
        }
    }

    async fn on_data(&self, bytes: &[u8]) {
        match self.absorb(bytes) {
            Absorbed::Nothing => {}
            Absorbed::Unsolicited(event) => self.listeners.dispatch(&event),
            Absorbed::Completed(event) => {
                if let Some(event) = event {
                    self.listeners.dispatch(&event);
                }
                self.retire(1);
            }
            Absorbed::Resume(outbound) => {
                self.transmit(outbound).await;
            }
        }
    }

    /// Appends `bytes` to the response buffer and offers it to the command in
    /// flight.
    fn absorb(&self, bytes: &[u8]) -> Absorbed {
        let mut core = self.core();
        core.buffer.extend_from_slice(bytes);
        let buffer = std::mem::take(&mut core.buffer);
        let decoded = self
            .incoming
            .try_peek_with(|command| command.decode(&buffer));

        match decoded {
            None => {
                if let Some(outcome) = self.driver.guess(&buffer) {
                    return record(&mut core, outcome)
                        .map_or(Absorbed::Nothing, Absorbed::Unsolicited);
                }
                if buffer.contains(&b'\r') {
                    debug!(frame = %format_frame(&buffer), "dropping unsolicited bytes");
                } else {
                    core.buffer = buffer;
                }
                Absorbed::Nothing
            }
            Some(Decoded::Incomplete) => {
                core.buffer = buffer;
                Absorbed::Nothing
            }
            Some(Decoded::Unrecognized) => {
                if let Some(outcome) = self.driver.guess(&buffer) {
                    return record(&mut core, outcome)
                        .map_or(Absorbed::Nothing, Absorbed::Unsolicited);
                }
                warn!(
                    command = self.incoming.try_peek_with(|command| command.name()),
                    frame = %format_frame(&buffer),
                    "discarding unrecognised response"
                );
                Absorbed::Nothing
            }
            Some(Decoded::Complete(outcome)) => {
                self.timer.cancel();
                if let Some(saved) = core.saved.take() {
                    if let Outcome::Identified { serial_number, .. } = outcome {
                        core.serial_number = Some(serial_number);
                    }
                    let outbound = Outbound::of(saved.as_ref());
                    return match self.incoming.replace_next(saved) {
                        Ok(probe) => {
                            info!(
                                probe = probe.name(),
                                command = outbound.name,
                                "instrument answered probe, resending command"
                            );
                            core.recovered = true;
                            core.transition(SessionState::AwaitingResponse);
                            Absorbed::Resume(outbound)
                        }
                        Err(_saved) => Absorbed::Nothing,
                    };
                }
                core.recovered = false;
                if let Some(completed) = self.incoming.try_remove() {
                    debug!(command = completed.name(), "exchange complete");
                    if let Some(field) = completed.setting() {
                        if outcome.status().is_error() {
                            warn!(setting = %field, "instrument refused setting");
                            core.unconfirmed.insert(field);
                        } else {
                            core.unconfirmed.remove(&field);
                        }
                    }
                }
                core.transition(SessionState::Idle);
                Absorbed::Completed(record(&mut core, outcome))
            }
        }
    }

    async fn on_timeout(&self) {
        match self.escalate() {
            Escalation::Ignored => {}
            Escalation::Probe(outbound) => {
                self.transmit(outbound).await;
            }
            Escalation::Abandoned(event) => {
                self.listeners.dispatch(&event);
                self.retire(1);
            }
        }
    }

    /// First expiry swaps the in-flight command for a probe. An expiry while
    /// probing, or a second one for a command already resent after a probe,
    /// gives the command up.
    fn escalate(&self) -> Escalation {
        let mut core = self.core();
        core.buffer.clear();
        if core.is_recovering() {
            drop(core);
            warn!("instrument did not answer the recovery probe");
            return Escalation::Abandoned(self.abandon_in_flight(InstrumentStatus::fault(
                FaultKind::Timeout,
                "instrument did not respond, even after a recovery probe",
            )));
        }
        if core.recovered {
            drop(core);
            warn!("resent command went unanswered after a recovery probe");
            return Escalation::Abandoned(self.abandon_in_flight(InstrumentStatus::fault(
                FaultKind::Timeout,
                "instrument answered the recovery probe but not the resent command",
            )));
        }

        let probe = self.driver.probe_command();
        let outbound = Outbound::of(probe.as_ref());
        match self.incoming.replace_next(probe) {
            Ok(original) => {
                warn!(
                    command = original.name(),
                    probe = outbound.name,
                    "response window expired, probing instrument"
                );
                core.saved = Some(original);
                core.transition(SessionState::Recovering);
                Escalation::Probe(outbound)
            }
            Err(_probe) => Escalation::Ignored,
        }
    }

    fn fail(&self, status: InstrumentStatus) {
        let event = self.abandon_in_flight(status);
        self.listeners.dispatch(&event);
        self.retire(1);
    }

    /// Drops the command in flight, and any command saved by recovery.
    fn abandon_in_flight(&self, status: InstrumentStatus) -> InstrumentEvent {
        self.timer.cancel();
        let mut core = self.core();
        core.recovered = false;
        core.buffer.clear();
        let in_flight = self.incoming.try_remove();
        if let Some(dropped) = core.saved.take().or(in_flight) {
            warn!(command = dropped.name(), "dropping command");
            if let Some(field) = dropped.setting() {
                core.unconfirmed.insert(field);
            }
        }
        core.transition(SessionState::Idle);
        InstrumentEvent::OperationalStatusChanged(OperationalStatusEvent::new(
            status,
            core.serial_number.clone(),
        ))
    }
}

/// Folds a decoded outcome into the session core and builds its event.
fn record(core: &mut SessionCore, outcome: Outcome) -> Option<InstrumentEvent> {
    match outcome {
        Outcome::Measured(measurement) => {
            Some(InstrumentEvent::Measured(MeasuredEvent::new(measurement)))
        }
        Outcome::Calibrated { step, status } => Some(InstrumentEvent::Calibrated(
            CalibratedEvent::new(step, status),
        )),
        Outcome::SettingsChanged { update, status } => {
            let snapshot = core.snapshot.as_mut()?;
            snapshot.apply(&update);
            Some(InstrumentEvent::SettingsChanged(SettingsChangedEvent::new(
                snapshot.clone(),
                status,
            )))
        }
        Outcome::Identified {
            serial_number,
            status,
        } => {
            info!(%serial_number, "instrument identified");
            core.serial_number = Some(serial_number.clone());
            Some(InstrumentEvent::OperationalStatusChanged(
                OperationalStatusEvent::new(status, Some(serial_number)),
            ))
        }
        Outcome::Acknowledged(status) if status.is_success() => None,
        Outcome::Acknowledged(status) => Some(InstrumentEvent::OperationalStatusChanged(
            OperationalStatusEvent::new(status, core.serial_number.clone()),
        )),
    }
}

async fn run_worker(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = shared.next_outgoing() => next,
        };
        let Ok(command) = next else {
            break;
        };
        shared.send_next(command).await;
    }
    debug!("session worker stopped");
}

async fn run_notifications(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    mut expiries: mpsc::UnboundedReceiver<u64>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => shared.on_transport_event(event).await,
                None => break,
            },
            Some(generation) = expiries.recv() => shared.on_expiry(generation).await,
        }
    }
    debug!("session notifications stopped");
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::drivers::DriverModel;
    use crate::settings::ConnectionConfig;
    use crate::transport::FakeInstrument;

    fn session(model: DriverModel) -> InstrumentSession {
        InstrumentSession::new(model.driver(), Box::new(FakeInstrument::silent().transport()))
    }

    #[test]
    fn default_options_queue_five_commands() {
        let options = SessionOptions::default();
        assert_eq!(Capacity::Bounded(5), options.outgoing_capacity);
        assert_eq!(None, options.response_timeout);
    }

    #[tokio::test]
    async fn operations_before_connecting_are_rejected() {
        let session = session(DriverModel::Ce7000);

        assert_matches!(session.measure(), Err(SessionError::NotConnected));
        assert_matches!(session.calibrate(0), Err(SessionError::NotConnected));
        assert_eq!(SessionState::Uninitialized, session.state());
    }

    #[tokio::test]
    async fn unsupported_requests_fail_before_connection_checks() {
        let session = session(DriverModel::Cm2002);

        assert_matches!(
            session.calibrate(1),
            Err(SessionError::UnsupportedCalibration { step: 1, model: DriverModel::Cm2002 })
        );
        assert_matches!(
            session.calibrate(9),
            Err(SessionError::UnsupportedCalibration { step: 9, .. })
        );
        assert_matches!(
            session.retrieve_stored_sample(0),
            Err(SessionError::UnsupportedOperation { operation: "retrieve_stored_sample", .. })
        );
    }

    #[tokio::test]
    async fn disposing_an_unopened_session_is_terminal() {
        let session = session(DriverModel::Sp62);

        session.dispose().await;
        session.dispose().await;

        assert_eq!(SessionState::Disposed, session.state());
        assert_matches!(session.measure(), Err(SessionError::Disposed));
        let settings = InstrumentSettings::builder()
            .connection(ConnectionConfig::builder().port("fake").build())
            .build();
        assert_matches!(
            session.apply_settings(settings).await,
            Err(SessionError::Disposed)
        );
    }

    #[test]
    fn acknowledged_success_is_not_reported() {
        let mut core = SessionCore::default();
        assert_eq!(
            None,
            record(&mut core, Outcome::Acknowledged(InstrumentStatus::success()))
        );
    }

    #[test]
    fn identification_updates_the_serial_number() {
        let mut core = SessionCore::default();

        let event = record(
            &mut core,
            Outcome::Identified {
                serial_number: "7A001234".into(),
                status: InstrumentStatus::success(),
            },
        );

        assert_eq!(Some("7A001234".to_string()), core.serial_number);
        assert_matches!(
            event,
            Some(InstrumentEvent::OperationalStatusChanged(status))
                if status.serial_number() == Some("7A001234")
        );
    }
}
