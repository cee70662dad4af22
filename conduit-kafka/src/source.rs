//! Ordered consumer.
//!
//! [`KafkaSource`] delivers records from a consumer-group session to the
//! caller and accepts acknowledgments strictly in delivery order. Each
//! accepted acknowledgment commits exactly the acknowledged record's offset,
//! so the group's committed progress never runs ahead of the caller.
//!
//! # Lifecycle
//!
//! A consume invocation opens its own session and closes it on every exit
//! path. Messages delivered but not yet acknowledged when it returns are
//! dropped from memory; the next session resumes from the last commit and
//! redelivers them.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{AsyncMessageSource, Cancellation, Message, Result, SessionId, Status};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, ConsumerEvent, ConsumerSession};
use crate::client::KafkaBroker;
use crate::config::SourceConfig;
use crate::error::settle_close;
use crate::ledger::InFlightLedger;
use crate::status::topic_status;

/// Consumes messages from a Kafka topic as a member of a consumer group.
pub struct KafkaSource<B = KafkaBroker> {
    broker: Arc<B>,
    topic: String,
    group: String,
}

impl KafkaSource {
    /// Connects a source using its own broker client.
    ///
    /// # Errors
    ///
    /// Returns [`conduit_core::Error::InvalidConfig`] if the configuration is
    /// invalid.
    pub fn connect(config: SourceConfig) -> Result<Self> {
        config.validate()?;
        let broker = KafkaBroker::new(config.broker_config())?;
        info!(topic = %config.topic, group = %config.consumer_group, "Kafka source connected");
        Ok(Self::with_broker(
            Arc::new(broker),
            config.topic,
            config.consumer_group,
        ))
    }
}

impl<B: BrokerClient> KafkaSource<B> {
    /// Creates a source over an existing, possibly shared, broker client.
    #[must_use]
    pub fn with_broker(broker: Arc<B>, topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            group: group.into(),
        }
    }

    /// Returns the source topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the consumer group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the underlying broker client.
    #[must_use]
    pub const fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    #[tracing::instrument(
        skip_all,
        name = "consume",
        fields(topic = %self.topic, group = %self.group, session = %SessionId::issue())
    )]
    async fn consume(
        &self,
        mut cancel: Cancellation,
        messages: mpsc::Sender<Message>,
        mut acks: mpsc::Receiver<Message>,
    ) -> Result<()> {
        let mut session = self.broker.open_consumer(&self.topic, &self.group).await?;
        debug!("Consumer session opened");

        let mut ledger = InFlightLedger::new();
        let outcome = run_consume(&mut session, &mut ledger, &mut cancel, &messages, &mut acks).await;

        if !ledger.is_empty() {
            debug!(
                unacknowledged = ledger.len(),
                "Discarding unacknowledged messages; they will be redelivered"
            );
        }

        let closed = session.close().await;
        debug!("Consumer session closed");
        settle_close(outcome, closed)
    }
}

/// Runs one consume session until cancellation, a closed stream, or an error.
async fn run_consume<S: ConsumerSession>(
    session: &mut S,
    ledger: &mut InFlightLedger,
    cancel: &mut Cancellation,
    messages: &mpsc::Sender<Message>,
    acks: &mut mpsc::Receiver<Message>,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(in_flight = ledger.len(), "Consume cancelled");
                return Ok(());
            }

            ack = acks.recv() => {
                let Some(acked) = ack else {
                    debug!("Acknowledgment stream closed by caller");
                    return Ok(());
                };

                let position = match ledger.check_ack(&acked) {
                    Ok(position) => position,
                    Err(err) => {
                        warn!(error = %err, "Invalid acknowledgment");
                        return Err(err.into());
                    }
                };

                // Commit before popping: a failed commit leaves the head in
                // place and ends the session.
                if let Err(err) = session.commit(position).await {
                    warn!(%position, error = %err, "Offset commit failed");
                    return Err(err.into());
                }
                ledger.pop_head();
                debug!(
                    message_id = %acked.id(),
                    partition = position.partition,
                    offset = position.offset,
                    "Committed"
                );
            }

            event = session.next_event() => match event {
                ConsumerEvent::Record(record) => {
                    let message = Message::new(record.payload);

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!(in_flight = ledger.len(), "Consume cancelled during delivery");
                            return Ok(());
                        }
                        sent = messages.send(message.clone()) => {
                            if sent.is_err() {
                                debug!("Delivery stream closed by caller");
                                return Ok(());
                            }
                        }
                    }

                    debug!(
                        message_id = %message.id(),
                        position = %record.position,
                        "Delivered"
                    );
                    ledger.record_delivery(message, record.position);
                }
                ConsumerEvent::Error(err) => {
                    warn!(error = %err, "Consumer session failed");
                    return Err(err.into());
                }
            }
        }
    }
}

impl<B> std::fmt::Debug for KafkaSource<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSource")
            .field("topic", &self.topic)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<B: BrokerClient> AsyncMessageSource for KafkaSource<B> {
    async fn consume_messages(
        &self,
        cancel: Cancellation,
        messages: mpsc::Sender<Message>,
        acks: mpsc::Receiver<Message>,
    ) -> Result<()> {
        self.consume(cancel, messages, acks).await
    }

    async fn status(&self) -> Result<Status> {
        topic_status(self.broker.as_ref(), &self.topic).await
    }

    fn close(&self) -> Result<()> {
        self.broker.close()?;
        Ok(())
    }
}
