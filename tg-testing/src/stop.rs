//! Cooperative stop requests
//!
//! A stop never interrupts a running unit; the runner checks the signal
//! before starting each new one.

use tokio::sync::watch;

/// Sending side of a stop request.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side of a stop request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopHandle {
    pub fn new() -> (Self, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, StopSignal { rx })
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl StopSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested.
    ///
    /// If the handle is dropped without stopping, this never resolves.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
