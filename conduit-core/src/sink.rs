//! The producing half of the messaging abstraction.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::Cancellation;
use crate::error::Result;
use crate::message::Message;
use crate::status::Status;

/// A destination that accepts messages and acknowledges them asynchronously.
///
/// Callers push messages into `messages` and receive each message back on
/// `acks` once the backing transport has durably accepted it. Acknowledgments
/// carry the caller's own handle, so identity can be compared with `==`.
#[async_trait]
pub trait AsyncMessageSink: Send + Sync {
    /// Publishes messages until cancelled, the input stream ends, or an error
    /// occurs.
    ///
    /// Returns `Ok(())` on cancellation and after the input stream closes and
    /// every in-flight message has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns the first broker error observed; no acknowledgments are emitted
    /// after this returns.
    async fn publish_messages(
        &self,
        cancel: Cancellation,
        acks: mpsc::Sender<Message>,
        messages: mpsc::Receiver<Message>,
    ) -> Result<()>;

    /// Reports the health of the backing destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be reached at all.
    async fn status(&self) -> Result<Status>;

    /// Closes the underlying client.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Closed`] if already closed.
    fn close(&self) -> Result<()>;
}
