//! Request-reply helpers for agent messages
//!
//! acton-reactive messages must be `Clone`, so the oneshot sender a caller
//! waits on is wrapped in `Arc<Mutex<Option<...>>>` and taken exactly once by
//! the handler that answers.

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Response channel carried inside a request message
pub type ResponseChannel<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

/// Create both sides of a request-reply exchange
#[must_use]
pub fn create_request_reply<T>() -> (ResponseChannel<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

/// Answer a request
///
/// # Errors
///
/// Returns `Err(value)` if the receiver was dropped or the channel was already used.
pub async fn send_response<T>(response_tx: ResponseChannel<T>, value: T) -> Result<(), T> {
    let tx = response_tx.lock().await.take();
    if let Some(tx) = tx {
        tx.send(value)
    } else {
        Err(value)
    }
}
