use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(90);

/// Spinner shown on stderr while the instrument works through queued commands.
///
/// Instrument waits can run into a full response window plus a recovery
/// probe, so the elapsed time is shown next to the message.
#[derive(Debug)]
pub(crate) struct Spinner {
    enabled: bool,
}

impl Spinner {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Awaits `wait`, rendering `message` while it is pending.
    pub(crate) async fn while_waiting<F, Fut, T>(&self, message: &str, wait: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.enabled {
            return wait().await;
        }

        let bar = ProgressBar::new_spinner()
            .with_style(waiting_style())
            .with_message(message.to_owned());
        bar.enable_steady_tick(TICK_INTERVAL);
        let result = wait().await;
        bar.finish_and_clear();
        result
    }
}

fn waiting_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}
