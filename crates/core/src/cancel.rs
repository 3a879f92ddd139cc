// Run Cancellation Signal

use tokio::sync::watch;

/// Observer side of the run-wide cancellation signal
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check if cancellation was broadcast
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is broadcast
    ///
    /// Never resolves if the signal is dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// A token whose signal can never fire
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }
}

/// Broadcaster side; owned by the dispatcher only
#[derive(Debug)]
pub struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    /// Broadcast cancellation to every token
    ///
    /// One-shot: returns true only for the call that actually fired.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelSignal, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSignal { tx }, CancelToken { rx })
}
