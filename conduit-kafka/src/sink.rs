//! Ordered publisher.
//!
//! [`KafkaSink`] drains the caller's message stream into a producer session
//! and returns each message on the acknowledgment stream once the broker has
//! stored it. Acknowledgments are forwarded by a separate task so a caller
//! that drains acks slowly never stalls the send path, and a slow broker
//! never stalls ack delivery.
//!
//! ```text
//! messages ──► publish loop ──► ProducerSession ──► broker
//!                  ▲                                  │
//!                  │ errors                successes  ▼
//!                  └──────────────── ack forwarder ──► acks
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{
    cancellation, AsyncMessageSink, Cancellation, Error, Message, Result, SessionId, Status,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, ProducerSession, SendRequest};
use crate::client::KafkaBroker;
use crate::config::{KeyFn, SinkConfig};
use crate::error::{settle_close, BrokerError};
use crate::partitioner::Partitioner;
use crate::status::topic_status;

/// Why the ack forwarder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardExit {
    /// Every message sent before the input closed was acknowledged.
    Drained,
    /// The publish loop asked it to stop.
    Stopped,
    /// The caller dropped the acknowledgment stream.
    AckStreamClosed,
    /// The session's success channel ended.
    SuccessesClosed,
}

/// Forwards broker successes to the caller until stopped.
///
/// `drain` carries the number of messages sent once the input stream has
/// closed; the forwarder then finishes after that many acknowledgments.
async fn forward_acks(
    mut successes: mpsc::UnboundedReceiver<Message>,
    acks: mpsc::Sender<Message>,
    mut stop: Cancellation,
    mut drain: oneshot::Receiver<u64>,
) -> ForwardExit {
    let mut forwarded: u64 = 0;
    let mut expected: Option<u64> = None;
    let mut drain_open = true;

    loop {
        if expected.is_some_and(|total| forwarded >= total) {
            return ForwardExit::Drained;
        }

        tokio::select! {
            biased;

            () = stop.cancelled() => return ForwardExit::Stopped,

            total = &mut drain, if drain_open => {
                drain_open = false;
                expected = total.ok();
            }

            success = successes.recv() => {
                let Some(message) = success else {
                    return ForwardExit::SuccessesClosed;
                };
                let id = message.id();

                // Handing the ack over is itself interruptible.
                tokio::select! {
                    biased;
                    () = stop.cancelled() => return ForwardExit::Stopped,
                    sent = acks.send(message) => {
                        if sent.is_err() {
                            return ForwardExit::AckStreamClosed;
                        }
                    }
                }
                forwarded += 1;
                debug!(message_id = %id, "Acknowledged");
            }
        }
    }
}

/// Publishes messages to a Kafka topic, acknowledging each once stored.
pub struct KafkaSink<B = KafkaBroker> {
    broker: Arc<B>,
    topic: String,
    key_fn: Option<KeyFn>,
}

impl KafkaSink {
    /// Connects a sink using its own broker client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn connect(config: SinkConfig) -> Result<Self> {
        config.validate()?;
        let broker = KafkaBroker::new(config.broker_config())?;
        info!(topic = %config.topic, "Kafka sink connected");
        Ok(Self::with_broker(Arc::new(broker), config.topic, config.key_fn))
    }
}

impl<B: BrokerClient> KafkaSink<B> {
    /// Creates a sink over an existing, possibly shared, broker client.
    ///
    /// With a key function, messages are partitioned by key hash; without
    /// one, they are spread round-robin.
    #[must_use]
    pub fn with_broker(broker: Arc<B>, topic: impl Into<String>, key_fn: Option<KeyFn>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            key_fn,
        }
    }

    /// Returns the destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the underlying broker client.
    #[must_use]
    pub const fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    fn partitioner(&self) -> Partitioner {
        Partitioner::for_keyed(self.key_fn.is_some())
    }

    #[tracing::instrument(skip_all, name = "publish", fields(topic = %self.topic, session = %SessionId::issue()))]
    async fn publish(
        &self,
        mut cancel: Cancellation,
        acks: mpsc::Sender<Message>,
        mut messages: mpsc::Receiver<Message>,
    ) -> Result<()> {
        let (mut session, events) = self
            .broker
            .open_producer(&self.topic, self.partitioner())
            .await?;
        let mut errors = events.errors;
        debug!("Producer session opened");

        let (stop_handle, stop) = cancellation();
        let (drain_tx, drain_rx) = oneshot::channel();
        let mut drain_tx = Some(drain_tx);
        let mut forwarder = tokio::spawn(forward_acks(events.successes, acks, stop, drain_rx));
        let mut forwarder_done = false;

        let mut sent: u64 = 0;
        let mut input_open = true;

        let outcome: Result<()> = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(sent, "Publish cancelled");
                    break Ok(());
                }

                Some(err) = errors.recv() => {
                    warn!(error = %err, "Broker rejected message");
                    break Err(err.into());
                }

                exit = &mut forwarder => {
                    forwarder_done = true;
                    match exit {
                        Ok(ForwardExit::Drained) => {
                            debug!(sent, "Input closed and all messages acknowledged");
                            break Ok(());
                        }
                        Ok(ForwardExit::AckStreamClosed) => {
                            debug!("Acknowledgment stream closed by caller");
                            break Ok(());
                        }
                        Ok(ForwardExit::Stopped) => break Ok(()),
                        Ok(ForwardExit::SuccessesClosed) => {
                            break Err(BrokerError::SessionClosed.into());
                        }
                        Err(err) => break Err(Error::Internal(format!("ack forwarder failed: {err}"))),
                    }
                }

                next = messages.recv(), if input_open => {
                    let Some(message) = next else {
                        input_open = false;
                        debug!(sent, "Input stream closed, draining acknowledgments");
                        if let Some(tx) = drain_tx.take() {
                            let _ = tx.send(sent);
                        }
                        continue;
                    };

                    let key = self.key_fn.as_ref().map(|key_fn| key_fn(&message));
                    let id = message.id();
                    let request = SendRequest::new(message, key);

                    // A send may wait on client backpressure; delivery errors
                    // for earlier messages must still end the loop.
                    let accepted = tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!(sent, "Publish cancelled during send");
                            break Ok(());
                        }
                        Some(err) = errors.recv() => {
                            warn!(error = %err, "Broker rejected message while send was pending");
                            break Err(err.into());
                        }
                        accepted = session.send(request) => accepted,
                    };
                    if let Err(err) = accepted {
                        warn!(message_id = %id, error = %err, "Send refused");
                        break Err(err.into());
                    }
                    sent += 1;
                }
            }
        };

        stop_handle.cancel();
        if !forwarder_done {
            if let Err(err) = forwarder.await {
                warn!(error = %err, "Ack forwarder did not stop cleanly");
            }
        }

        let closed = session.close().await;
        debug!("Producer session closed");
        settle_close(outcome, closed)
    }
}

impl<B> std::fmt::Debug for KafkaSink<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSink")
            .field("topic", &self.topic)
            .field("keyed", &self.key_fn.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<B: BrokerClient> AsyncMessageSink for KafkaSink<B> {
    async fn publish_messages(
        &self,
        cancel: Cancellation,
        acks: mpsc::Sender<Message>,
        messages: mpsc::Receiver<Message>,
    ) -> Result<()> {
        self.publish(cancel, acks, messages).await
    }

    async fn status(&self) -> Result<Status> {
        topic_status(self.broker.as_ref(), &self.topic).await
    }

    fn close(&self) -> Result<()> {
        self.broker.close()?;
        Ok(())
    }
}
