//! Exception-reporting channel.
//!
//! Every contained failure (an adapter that fails to initialize, a subscriber
//! that faults while handling a republished notification, a bad configuration
//! row) becomes a non-fatal [`ProcessException`].  It is logged with
//! `tracing` and broadcast to any host-side receivers over a
//! [`tokio::sync::broadcast`] channel so a slow receiver never blocks the
//! reporting thread.

use tokio::sync::broadcast;
use tracing::warn;
use tsflow_types::AdapterError;

/// Default number of buffered reports before slow receivers start lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Receiving end handed out by [`ExceptionChannel::subscribe`].
pub type ExceptionReceiver = broadcast::Receiver<ProcessException>;

/// A reported, non-fatal failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessException {
    /// Name of the collection (or component) that caught the failure.
    pub origin: String,
    pub error: AdapterError,
}

/// Cloneable handle for reporting and observing process exceptions.  All
/// clones share one underlying channel.
#[derive(Clone, Debug)]
pub struct ExceptionChannel {
    sender: broadcast::Sender<ProcessException>,
}

impl ExceptionChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Log and broadcast a failure.  Having no receivers is normal.
    pub fn report(&self, origin: &str, error: AdapterError) {
        warn!(origin = %origin, error = %error, "process exception");
        let _ = self.sender.send(ProcessException {
            origin: origin.to_string(),
            error,
        });
    }

    pub fn subscribe(&self) -> ExceptionReceiver {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ExceptionChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Drain everything currently buffered on `rx` without waiting.
pub fn drain(rx: &mut ExceptionReceiver) -> Vec<ProcessException> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(e) => out.push(e),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!(lagged_by = n, "exception receiver lagged");
            }
            Err(_) => return out,
        }
    }
}
