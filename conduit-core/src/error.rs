//! Error types for Conduit sinks and sources.
//!
//! Every error terminates the operation that produced it. Cancellation is not
//! an error: operations return `Ok(())` when their cancellation fires.

use thiserror::Error;

use crate::message::Message;

/// Boxed error from a broker backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The result type for Conduit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Conduit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker or its client failed. Never retried locally.
    #[error("broker error: {0}")]
    Broker(#[source] BoxError),

    /// The caller acknowledged a message out of order.
    #[error(transparent)]
    InvalidAck(#[from] InvalidAckError),

    /// The configuration was rejected before any connection was made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The sink or source has already been closed.
    #[error("client is closed")]
    Closed,

    /// A task owned by the operation failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps a backend error as [`Error::Broker`].
    pub fn broker<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Broker(Box::new(err))
    }

    /// Returns the invalid acknowledgment, if this is a protocol violation.
    #[must_use]
    pub const fn as_invalid_ack(&self) -> Option<&InvalidAckError> {
        match self {
            Self::InvalidAck(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true for broker-side failures.
    #[must_use]
    pub const fn is_broker(&self) -> bool {
        matches!(self, Self::Broker(_))
    }
}

/// The caller acknowledged a message that was not next in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAckError {
    /// The message the caller acknowledged.
    pub acked: Message,
    /// The message that was due, or `None` if nothing awaited acknowledgment.
    pub expected: Option<Message>,
}

impl std::fmt::Display for InvalidAckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.expected {
            Some(expected) => write!(
                f,
                "invalid acknowledgment: acked {} but expected {}",
                self.acked, expected
            ),
            None => write!(
                f,
                "invalid acknowledgment: acked {} but no message awaits acknowledgment",
                self.acked
            ),
        }
    }
}

impl std::error::Error for InvalidAckError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ack_display_names_both_messages() {
        let acked = Message::new("b");
        let expected = Message::new("a");
        let err = InvalidAckError {
            acked: acked.clone(),
            expected: Some(expected.clone()),
        };

        let msg = format!("{err}");
        assert!(msg.contains(&acked.id().to_string()));
        assert!(msg.contains(&expected.id().to_string()));
    }

    #[test]
    fn test_invalid_ack_display_without_expected() {
        let err = InvalidAckError {
            acked: Message::new("a"),
            expected: None,
        };
        assert!(format!("{err}").contains("no message awaits acknowledgment"));
    }

    #[test]
    fn test_error_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::broker(io);
        assert!(err.is_broker());
        assert!(err.as_invalid_ack().is_none());
        assert!(format!("{err}").contains("refused"));

        let err: Error = InvalidAckError {
            acked: Message::new("x"),
            expected: None,
        }
        .into();
        assert!(!err.is_broker());
        assert!(err.as_invalid_ack().is_some());
    }
}
