//! Inactivity countdown for the signed-in session.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Kind of user interaction that counts as activity.
///
/// All kinds reset the countdown the same way; the kind only shows up
/// in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    Pointer,
    Key,
    Scroll,
    Touch,
}

/// One-shot countdown that runs a timeout action after a period with no
/// recorded activity.
///
/// Exactly one countdown is live at a time: starting a new one replaces
/// and cancels the previous one, and the timeout action runs at most
/// once per start.
pub(crate) struct InactivityTimer {
    timeout: Duration,
    /// Sender half of the activity channel; present while a countdown runs.
    activity_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl InactivityTimer {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            activity_tx: Mutex::new(None),
        }
    }

    /// Start (or restart) the countdown. `on_timeout` runs once if the
    /// full timeout elapses with no recorded activity.
    pub(crate) fn start<F>(&self, on_timeout: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        // Replacing the sender tears down any previous countdown task
        *self.activity_tx.lock().unwrap() = Some(tx);

        let timeout = self.timeout;
        tokio::spawn(async move {
            let fired = loop {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => break true,
                    signal = rx.recv() => match signal {
                        // Activity arrived; the next iteration restarts
                        // the full window
                        Some(()) => {}
                        None => break false,
                    }
                }
            };

            if fired {
                on_timeout.await;
            }
        });
    }

    /// Record activity, postponing the deadline. No-op when no countdown
    /// is running. Signals are coalesced: a full channel already carries
    /// a pending reset.
    pub(crate) fn touch(&self) {
        if let Some(tx) = self.activity_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(());
        }
    }

    /// Cancel the countdown without firing.
    pub(crate) fn stop(&self) {
        self.activity_tx.lock().unwrap().take();
    }
}
