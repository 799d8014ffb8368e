use tokio::sync::broadcast;

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Sender`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the
/// server should shut down.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal
/// has been received. Callers may query whether the shutdown signal has been
/// received via `is_shutdown`.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received.
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Shutdown {
            shutdown: self.shutdown,
            notify: self.notify.resubscribe(),
        }
    }
}
