//! Broker client abstraction.
//!
//! This module defines the narrow contract the ordered publisher and
//! consumer need from a broker, allowing different implementations for
//! production (librdkafka) and tests (in-memory simulation).
//!
//! # Design
//!
//! A [`BrokerClient`] is the shared, long-lived connection. Every publish or
//! consume invocation opens its own session from it and owns that session
//! exclusively until it returns:
//!
//! - [`ProducerSession`]: asynchronous sends; outcomes arrive later on the
//!   [`ProducerEvents`] channels, carrying the message handed in as the
//!   correlation token
//! - [`ConsumerSession`]: a stream of delivered records and errors, plus
//!   offset commits

use async_trait::async_trait;
use bytes::Bytes;
use conduit_core::Message;
use tokio::sync::mpsc;

use crate::error::{BrokerError, BrokerResult};
use crate::partitioner::Partitioner;

/// Location of a record within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Partition the record belongs to.
    pub partition: i32,
    /// Offset of the record within its partition.
    pub offset: i64,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }

    /// Returns the offset a consumer resumes from once this record is
    /// committed.
    #[must_use]
    pub const fn next_offset(self) -> i64 {
        self.offset + 1
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

/// A message handed to a producer session.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Partitioning key, if the sink derives one.
    pub key: Option<Bytes>,
    /// Record value.
    pub payload: Bytes,
    /// Correlation token, returned unchanged on success.
    pub token: Message,
}

impl SendRequest {
    /// Builds a request whose payload and token come from `message`.
    #[must_use]
    pub fn new(message: Message, key: Option<Bytes>) -> Self {
        Self {
            key,
            payload: message.payload().clone(),
            token: message,
        }
    }
}

/// Asynchronous outcomes of a producer session's sends.
#[derive(Debug)]
pub struct ProducerEvents {
    /// Correlation tokens of successfully stored messages, in broker order.
    pub successes: mpsc::UnboundedReceiver<Message>,
    /// Send failures.
    pub errors: mpsc::UnboundedReceiver<BrokerError>,
}

/// The sending half of [`ProducerEvents`], held by a session implementation.
#[derive(Debug, Clone)]
pub struct ProducerEventSender {
    successes: mpsc::UnboundedSender<Message>,
    errors: mpsc::UnboundedSender<BrokerError>,
}

impl ProducerEventSender {
    /// Creates a linked sender/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, ProducerEvents) {
        let (successes_tx, successes) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        (
            Self {
                successes: successes_tx,
                errors: errors_tx,
            },
            ProducerEvents { successes, errors },
        )
    }

    /// Reports that the broker stored the message carrying `token`.
    ///
    /// Dropped silently once the owning operation has returned.
    pub fn success(&self, token: Message) {
        let _ = self.successes.send(token);
    }

    /// Reports a send failure.
    pub fn failure(&self, err: BrokerError) {
        let _ = self.errors.send(err);
    }
}

/// A record delivered by a consumer session.
#[derive(Debug, Clone)]
pub struct Record {
    /// Record value.
    pub payload: Bytes,
    /// Where the record lives; committed once acknowledged.
    pub position: Position,
}

/// An event from a consumer session.
#[derive(Debug)]
pub enum ConsumerEvent {
    /// A record is ready for delivery.
    Record(Record),
    /// The session failed.
    Error(BrokerError),
}

/// Health of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHealth {
    /// Partition ID.
    pub partition: i32,
    /// Current leader broker, if any.
    pub leader: Option<i32>,
    /// Broker-reported partition error, if any.
    pub error: Option<String>,
}

impl PartitionHealth {
    /// Returns true if the partition has a leader and no error.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        self.leader.is_some() && self.error.is_none()
    }
}

/// Health of a topic as reported by broker metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHealth {
    /// Topic name.
    pub topic: String,
    /// Broker-reported topic error, if any.
    pub error: Option<String>,
    /// Per-partition health.
    pub partitions: Vec<PartitionHealth>,
}

/// A sending session, owned by a single publish invocation.
#[async_trait]
pub trait ProducerSession: Send + 'static {
    /// Hands a request to the client's asynchronous send path.
    ///
    /// Completes once the client has accepted the request into its own
    /// buffers; the outcome is reported later via [`ProducerEvents`].
    ///
    /// # Errors
    ///
    /// Returns an error if the client refuses the request outright.
    async fn send(&mut self, request: SendRequest) -> BrokerResult<()>;

    /// Flushes requests already accepted and releases the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails or times out.
    async fn close(self) -> BrokerResult<()>;
}

/// A consuming session, owned by a single consume invocation.
#[async_trait]
pub trait ConsumerSession: Send + 'static {
    /// Waits for the next record or error. Must be cancel safe: dropping the
    /// future before it completes must not lose a record.
    async fn next_event(&mut self) -> ConsumerEvent;

    /// Marks the record at `position` as processed for the consumer group.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be issued.
    async fn commit(&mut self, position: Position) -> BrokerResult<()>;

    /// Leaves the consumer group and releases the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be closed cleanly.
    async fn close(self) -> BrokerResult<()>;
}

/// A shared broker connection that opens sessions and reports health.
///
/// Implementations must be `Send + Sync` so one client can back a sink and a
/// source at the same time.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Session type for publishing.
    type Producer: ProducerSession;
    /// Session type for consuming.
    type Consumer: ConsumerSession;

    /// Opens a producer session for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the topic cannot be used.
    async fn open_producer(
        &self,
        topic: &str,
        partitioner: Partitioner,
    ) -> BrokerResult<(Self::Producer, ProducerEvents)>;

    /// Joins `group` and opens a consumer session for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the subscription fails.
    async fn open_consumer(&self, topic: &str, group: &str) -> BrokerResult<Self::Consumer>;

    /// Fetches leader and error state for every partition of `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if no broker can be reached.
    async fn topic_health(&self, topic: &str) -> BrokerResult<TopicHealth>;

    /// Closes the client. Sessions opened later fail.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ClientClosed`] if already closed.
    fn close(&self) -> BrokerResult<()>;
}
