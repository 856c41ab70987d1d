//! Cancellation signal shared by the run loop and in-flight streams.

use std::future::{Future, pending};

use tokio::sync::watch;

use crate::pki::crl::TransportError;

/// Receiving side of a `watch::channel(false)`; sending `true` cancels.
///
/// Dropping the sender without sending `true` never cancels.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            pending::<()>().await;
        }
    }

    /// Run `fut`, failing with [`TransportError::Cancelled`] if cancellation
    /// arrives first.
    pub async fn guard<T, F>(&mut self, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        if self.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(TransportError::Cancelled),
            res = fut => res,
        }
    }
}
