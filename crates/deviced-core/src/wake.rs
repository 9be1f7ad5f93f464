//! Single-slot coalescing wake signals.
//!
//! A wake signal tells a worker "something changed, run a pass". Senders
//! never block: raising an already-raised signal is a no-op, so any burst
//! of changes collapses into at most one extra reconciliation pass.
//! Receivers drain the slot before starting work to keep that edge.

use tokio::sync::mpsc;

/// Creates a connected wake signal pair.
#[must_use]
pub fn wake_channel() -> (WakeSignal, WakeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (WakeSignal { tx }, WakeReceiver { rx })
}

/// Sending half of a wake signal. Cheap to clone.
#[derive(Clone)]
pub struct WakeSignal {
    tx: mpsc::Sender<()>,
}

impl WakeSignal {
    /// Raises the signal. Never blocks; a full slot means the wake is
    /// already pending and the send is dropped.
    pub fn raise(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving half of a wake signal.
pub struct WakeReceiver {
    rx: mpsc::Receiver<()>,
}

impl WakeReceiver {
    /// Waits for the next wake. Returns `false` when all senders are gone.
    pub async fn recv(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Consumes any pending wake without waiting.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}
