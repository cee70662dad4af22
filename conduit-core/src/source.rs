//! The consuming half of the messaging abstraction.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::Cancellation;
use crate::error::Result;
use crate::message::Message;
use crate::status::Status;

/// An origin that delivers messages and requires in-order acknowledgment.
///
/// Every message delivered on `messages` must be sent back on `acks`, in
/// exactly the order it was delivered. Progress is persisted only for the
/// acknowledged prefix; anything delivered but not acknowledged is delivered
/// again by a later session.
#[async_trait]
pub trait AsyncMessageSource: Send + Sync {
    /// Consumes messages until cancelled or an error occurs.
    ///
    /// Returns `Ok(())` on cancellation, or when the caller drops either
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAck`] when an acknowledgment does not
    /// name the oldest unacknowledged message, or the first broker error.
    async fn consume_messages(
        &self,
        cancel: Cancellation,
        messages: mpsc::Sender<Message>,
        acks: mpsc::Receiver<Message>,
    ) -> Result<()>;

    /// Reports the health of the backing origin.
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
