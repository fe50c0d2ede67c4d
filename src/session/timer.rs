use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Armed {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct TimerInner {
    expiries: Option<mpsc::UnboundedSender<u64>>,
    armed: Option<Armed>,
    generation: u64,
}

/// One-shot response window owned by a session.
///
/// Each `arm` spawns a fresh sleep that reports its generation on the channel
/// returned by [`ResponseTimer::attach`].
/// Re-arming or cancelling stops the previous sleep, and a late expiry whose
/// generation no longer matches is ignored by [`ResponseTimer::expire`].
#[derive(Debug)]
pub(crate) struct ResponseTimer {
    inner: Mutex<TimerInner>,
}

impl ResponseTimer {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(TimerInner {
                expiries: None,
                armed: None,
                generation: 0,
            }),
        }
    }

    /// Routes expiries to a new channel, replacing any earlier one.
    pub(crate) fn attach(&self) -> mpsc::UnboundedReceiver<u64> {
        let (expiries, receiver) = mpsc::unbounded_channel();
        self.lock().expiries = Some(expiries);
        receiver
    }

    fn lock(&self) -> MutexGuard<'_, TimerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new window, replacing any armed one.
    pub(crate) fn arm(&self, window: Duration) {
        let mut inner = self.lock();
        if let Some(previous) = inner.armed.take() {
            previous.cancel.cancel();
        }
        inner.generation += 1;
        let generation = inner.generation;
        let cancel = CancellationToken::new();
        if let Some(expiries) = inner.expiries.clone() {
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(window) => {
                            let _ = expiries.send(generation);
                        }
                    }
                }
            });
        }
        inner.armed = Some(Armed { generation, cancel });
    }

    /// Disarms the window. Returns whether one was armed.
    pub(crate) fn cancel(&self) -> bool {
        match self.lock().armed.take() {
            Some(armed) => {
                armed.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Consumes an expiry. Returns `true` only for the currently armed window.
    pub(crate) fn expire(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner
            .armed
            .as_ref()
            .is_some_and(|armed| armed.generation == generation)
        {
            inner.armed = None;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(15);

    #[tokio::test(start_paused = true)]
    async fn armed_window_expires_once() {
        let timer = ResponseTimer::new();
        let mut expiries = timer.attach();
        timer.arm(WINDOW);

        let generation = expiries.recv().await.expect("timer should report expiry");

        assert!(timer.expire(generation));
        assert!(!timer.expire(generation));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_window_never_fires() {
        let timer = ResponseTimer::new();
        let mut expiries = timer.attach();
        timer.arm(WINDOW);
        assert!(timer.cancel());

        tokio::time::sleep(WINDOW * 2).await;

        assert!(expiries.try_recv().is_err());
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_the_previous_window() {
        let timer = ResponseTimer::new();
        let mut expiries = timer.attach();
        timer.arm(WINDOW);
        tokio::time::sleep(WINDOW / 2).await;
        timer.arm(WINDOW);

        let generation = expiries.recv().await.expect("second window should expire");

        assert_eq!(2, generation);
        assert!(timer.expire(generation));
        assert!(expiries.try_recv().is_err());
    }
}
