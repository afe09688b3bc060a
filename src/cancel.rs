use crate::error::{Result, SyncError};
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation handle shared between a caller and in-flight work.
///
/// Cancelling is sticky: once set, every clone observes it and every pending
/// [`CancelToken::cancelled`] future resolves.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives as long as `self`, so this never resolves.
            std::future::pending::<()>().await;
        }
    }

    /// Return a timeout error if cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SyncError::TranscriptionTimeout(
                "attempt cancelled".to_string(),
            ));
        }
        Ok(())
    }
}
