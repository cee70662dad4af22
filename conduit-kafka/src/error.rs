//! Error types for Kafka-backed sinks and sources.

use conduit_core::MessageId;
use thiserror::Error;
use tracing::warn;

/// Result type for broker client operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors raised by a broker client or one of its sessions.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Error reported by librdkafka.
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The broker rejected or failed to deliver a message.
    #[error("delivery of {message} failed: {reason}")]
    Delivery {
        /// Identity of the message that failed.
        message: MessageId,
        /// Broker-supplied reason.
        reason: String,
    },

    /// No broker could be reached.
    #[error("broker unreachable: {message}")]
    Unreachable {
        /// Description of the connectivity failure.
        message: String,
    },

    /// The topic does not exist or has no partitions.
    #[error("topic not found: {topic}")]
    TopicNotFound {
        /// The topic that was requested.
        topic: String,
    },

    /// A session's event stream ended while the session was in use.
    #[error("broker session closed unexpectedly")]
    SessionClosed,

    /// The client was closed before the operation started.
    #[error("broker client is closed")]
    ClientClosed,

    /// The configuration was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Configuration error description.
        message: String,
    },

    /// A blocking client call could not be joined.
    #[error("client task failed: {message}")]
    Task {
        /// Join failure description.
        message: String,
    },
}

impl BrokerError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an unreachable error from any error type.
    pub fn unreachable<E: std::fmt::Display>(err: E) -> Self {
        Self::Unreachable {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for BrokerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}

impl From<BrokerError> for conduit_core::Error {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::InvalidConfig { message } => Self::InvalidConfig(message),
            BrokerError::ClientClosed => Self::Closed,
            other => Self::broker(other),
        }
    }
}

/// Combines an operation's outcome with the result of closing its session.
///
/// A clean exit reports the close result; a failed exit keeps its own error
/// and only logs the close failure.
pub(crate) fn settle_close(
    outcome: conduit_core::Result<()>,
    closed: BrokerResult<()>,
) -> conduit_core::Result<()> {
    match (outcome, closed) {
        (Ok(()), closed) => closed.map_err(Into::into),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close session after error");
            Err(err)
        }
    }
}
