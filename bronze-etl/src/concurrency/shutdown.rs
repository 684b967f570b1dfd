//! Graceful-shutdown signaling built on tokio watch channels.
//!
//! The transmitter is held by the pipeline (and whatever installs OS signal handlers);
//! receivers are handed to the extractor, which polls between container iterations so a
//! stop request never interrupts an in-flight page and the source session is always
//! closed before unwinding.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownTx {
    /// Signals shutdown to all subscribed receivers.
    ///
    /// Returns an error only when every receiver has already been dropped, which means
    /// there is nothing left to stop.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Creates a new receiver subscribed to this transmitter.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

impl ShutdownRx {
    /// Returns whether shutdown has been requested.
    ///
    /// Non-blocking; callers poll this at safe points rather than awaiting the signal.
    pub fn is_signaled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a new shutdown channel pair.
///
/// The channel starts in the not-signaled state. Receivers are obtained from the
/// transmitter via [`ShutdownTx::subscribe`].
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
