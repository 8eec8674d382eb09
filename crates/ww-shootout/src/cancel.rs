use std::sync::Arc;

use tokio::sync::watch;

/// Run context of one replica. Cancelling is idempotent and visible to every
/// clone.
#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Cancellation { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
