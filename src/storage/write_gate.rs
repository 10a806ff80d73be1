use tokio::sync::watch;
use tracing::trace;

/// Cooperative backpressure flag.
///
/// Not a lock: writers already past [`WriteGate::wait_writable`] are not stopped.
#[derive(Debug)]
pub struct WriteGate {
    writable: watch::Sender<bool>,
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteGate {
    pub fn new() -> Self {
        let (writable, _) = watch::channel(true);
        Self { writable }
    }

    pub fn is_writable(&self) -> bool {
        *self.writable.borrow()
    }

    pub fn block(&self) {
        trace!("write gate closed");
        self.writable.send_replace(false);
    }

    pub fn unblock(&self) {
        trace!("write gate opened");
        self.writable.send_replace(true);
    }

    /// Resolves immediately when writable, otherwise once the gate reopens.
    pub async fn wait_writable(&self) {
        let mut rx = self.writable.subscribe();
        let _ = rx.wait_for(|writable| *writable).await;
    }
}
