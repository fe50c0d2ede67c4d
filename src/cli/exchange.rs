use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::cli::command::InstrumentTarget;
use crate::cli::report::RunReport;
use crate::cli::ui::Spinner;
use crate::session::{ChannelListener, InstrumentEvent, InstrumentSession};
use crate::transport::Transport;

/// An open session plus every event it has reported so far.
pub(crate) struct Exchange {
    session: InstrumentSession,
    events: mpsc::UnboundedReceiver<InstrumentEvent>,
    observed: Vec<InstrumentEvent>,
    spinner: Spinner,
    port: String,
}

impl Exchange {
    /// Opens a session on `transport`, applies the target's settings and waits
    /// for the connect sequence to finish.
    #[instrument(skip_all, level = "info", fields(model = %target.driver()))]
    pub(crate) async fn open(
        target: InstrumentTarget,
        transport: Box<dyn Transport>,
        spinner: Spinner,
    ) -> Result<Self> {
        let session = InstrumentSession::new(target.driver().driver(), transport);
        let (sender, events) = mpsc::unbounded_channel();
        session.add_listener(Arc::new(ChannelListener::new(sender)));
        let port = target.settings().connection().port().to_owned();

        if let Err(error) = session.apply_settings(target.into_settings()).await {
            session.dispose().await;
            return Err(error.into());
        }

        let mut exchange = Self {
            session,
            events,
            observed: Vec::new(),
            spinner,
            port,
        };
        exchange.settle("Connecting to the instrument").await;
        Ok(exchange)
    }

    pub(crate) fn session(&self) -> &InstrumentSession {
        &self.session
    }

    /// Waits for every queued command to finish and collects the events.
    pub(crate) async fn settle(&mut self, message: &str) {
        let session = &self.session;
        self.spinner
            .while_waiting(message, || session.settled())
            .await;
        while let Ok(event) = self.events.try_recv() {
            self.observed.push(event);
        }
        debug!(events = self.observed.len(), "session settled");
    }

    pub(crate) async fn finish(self, command: &'static str, include_settings: bool) -> RunReport {
        let model = self.session.model();
        let serial_number = self.session.serial_number();
        let settings = if include_settings {
            self.session.settings()
        } else {
            None
        };
        self.session.dispose().await;
        RunReport::new(
            command,
            model,
            self.port,
            serial_number,
            settings,
            self.observed,
        )
    }
}
