//! librdkafka-backed broker client.
//!
//! [`KafkaBroker`] keeps one metadata client for health queries and opens a
//! fresh librdkafka producer or consumer for every session, so concurrent
//! publish or consume invocations never share broker-side state.
//!
//! Blocking librdkafka calls (metadata fetches, flushes) run on the blocking
//! thread pool. Offset commits are asynchronous; a commit the broker later
//! rejects is reported by the session's next event or commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::Message;
use rdkafka::client::ClientContext;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::Message as _;
use rdkafka::producer::{
    BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer,
};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::{
    BrokerClient, ConsumerEvent, ConsumerSession, PartitionHealth, Position, ProducerEventSender,
    ProducerEvents, ProducerSession, Record, SendRequest, TopicHealth,
};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::partitioner::{PartitionSelector, Partitioner};

/// Pause before retrying a send rejected because librdkafka's queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Broker client backed by librdkafka.
pub struct KafkaBroker {
    config: BrokerConfig,
    metadata: Arc<BaseProducer>,
    closed: AtomicBool,
}

impl KafkaBroker {
    /// Creates a client for the configured brokers.
    ///
    /// No connection is made until the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or librdkafka rejects
    /// it.
    pub fn new(config: BrokerConfig) -> BrokerResult<Self> {
        config.validate()?;
        if config.consumer.offsets_retention.is_some() {
            warn!("offsets retention is not supported by librdkafka and is ignored");
        }

        let metadata: BaseProducer = config.base_client_config().create()?;
        info!(brokers = %config.brokers.join(","), "Kafka client created");

        Ok(Self {
            config,
            metadata: Arc::new(metadata),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::ClientClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("brokers", &self.config.brokers)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Routes librdkafka delivery reports to a session's event channels.
struct DeliveryContext {
    events: ProducerEventSender,
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<Message>;

    fn delivery(&self, result: &DeliveryResult<'_>, token: Self::DeliveryOpaque) {
        match result {
            Ok(_) => self.events.success(*token),
            Err((err, _)) => self.events.failure(BrokerError::Delivery {
                message: token.id(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Producer session over a dedicated librdkafka producer.
pub struct KafkaProducerSession {
    producer: ThreadedProducer<DeliveryContext>,
    topic: String,
    selector: PartitionSelector,
    close_timeout: Duration,
}

impl KafkaProducerSession {
    /// Picks the partition for `request`, the same way every backend does.
    fn partition_for(&mut self, request: &SendRequest) -> i32 {
        self.selector.select(request.key.as_deref())
    }
}

impl std::fmt::Debug for KafkaProducerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducerSession")
            .field("topic", &self.topic)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProducerSession for KafkaProducerSession {
    async fn send(&mut self, request: SendRequest) -> BrokerResult<()> {
        let partition = self.partition_for(&request);

        let mut token = Box::new(request.token);
        loop {
            let mut record: BaseRecord<'_, [u8], [u8], Box<Message>> =
                BaseRecord::with_opaque_to(&self.topic, token).payload(&request.payload[..]);
            if let Some(key) = &request.key {
                record = record.key(&key[..]);
            }
            record = record.partition(partition);

            match self.producer.send(record) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), record)) => {
                    token = record.delivery_opaque;
                }
                Err((err, _)) => return Err(BrokerError::Kafka(err)),
            }
            tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
        }
    }

    async fn close(self) -> BrokerResult<()> {
        let timeout = self.close_timeout;
        let producer = self.producer;
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await??;
        debug!(topic = %self.topic, "Producer session closed");
        Ok(())
    }
}

/// Forwards failed offset commits to the session that issued them.
struct CommitContext {
    failures: mpsc::UnboundedSender<KafkaError>,
}

impl ClientContext for CommitContext {}

impl ConsumerContext for CommitContext {
    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(err) = result {
            // The receiver is gone only once the session is dropped.
            let _ = self.failures.send(err);
        }
    }
}

/// Consumer-group session over a dedicated librdkafka consumer.
pub struct KafkaConsumerSession {
    consumer: StreamConsumer<CommitContext>,
    commit_failures: mpsc::UnboundedReceiver<KafkaError>,
    topic: String,
}

impl std::fmt::Debug for KafkaConsumerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConsumerSession")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConsumerSession for KafkaConsumerSession {
    async fn next_event(&mut self) -> ConsumerEvent {
        tokio::select! {
            biased;

            Some(err) = self.commit_failures.recv() => {
                warn!(topic = %self.topic, error = %err, "Offset commit rejected");
                ConsumerEvent::Error(BrokerError::Kafka(err))
            }

            received = self.consumer.recv() => match received {
                Ok(message) => ConsumerEvent::Record(Record {
                    payload: message
                        .payload()
                        .map(bytes::Bytes::copy_from_slice)
                        .unwrap_or_default(),
                    position: Position::new(message.partition(), message.offset()),
                }),
                Err(err) => ConsumerEvent::Error(BrokerError::Kafka(err)),
            },
        }
    }

    async fn commit(&mut self, position: Position) -> BrokerResult<()> {
        // An earlier commit may have been rejected since the last event.
        if let Ok(err) = self.commit_failures.try_recv() {
            return Err(BrokerError::Kafka(err));
        }

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &self.topic,
            position.partition,
            Offset::Offset(position.next_offset()),
        )?;
        self.consumer.commit(&tpl, CommitMode::Async)?;
        Ok(())
    }

    async fn close(self) -> BrokerResult<()> {
        self.consumer.unsubscribe();
        debug!(topic = %self.topic, "Consumer session closed");
        // Dropping the consumer leaves the group.
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for KafkaBroker {
    type Producer = KafkaProducerSession;
    type Consumer = KafkaConsumerSession;

    async fn open_producer(
        &self,
        topic: &str,
        partitioner: Partitioner,
    ) -> BrokerResult<(Self::Producer, ProducerEvents)> {
        self.ensure_open()?;

        let (events_tx, events) = ProducerEventSender::channel();
        let producer: ThreadedProducer<DeliveryContext> = self
            .config
            .producer_client_config(partitioner)
            .create_with_context(DeliveryContext { events: events_tx })?;

        let health = self.topic_health(topic).await?;
        let count = u32::try_from(health.partitions.len()).unwrap_or(u32::MAX);
        if count == 0 {
            return Err(BrokerError::TopicNotFound {
                topic: topic.to_string(),
            });
        }
        let selector = PartitionSelector::new(partitioner, count);

        debug!(topic, ?partitioner, "Producer session opened");
        Ok((
            KafkaProducerSession {
                producer,
                topic: topic.to_string(),
                selector,
                close_timeout: self.config.producer.close_timeout,
            },
            events,
        ))
    }

    async fn open_consumer(&self, topic: &str, group: &str) -> BrokerResult<Self::Consumer> {
        self.ensure_open()?;

        let (failures, commit_failures) = mpsc::unbounded_channel();
        let consumer: StreamConsumer<CommitContext> = self
            .config
            .consumer_client_config(group)
            .create_with_context(CommitContext { failures })?;
        consumer.subscribe(&[topic])?;

        debug!(topic, group, "Consumer session opened");
        Ok(KafkaConsumerSession {
            consumer,
            commit_failures,
            topic: topic.to_string(),
        })
    }

    async fn topic_health(&self, topic: &str) -> BrokerResult<TopicHealth> {
        self.ensure_open()?;

        let client = Arc::clone(&self.metadata);
        let topic = topic.to_string();
        let timeout = self.config.metadata_timeout;

        tokio::task::spawn_blocking(move || {
            let metadata = client
                .client()
                .fetch_metadata(Some(topic.as_str()), Timeout::After(timeout))
                .map_err(BrokerError::unreachable)?;

            let Some(found) = metadata.topics().iter().find(|t| t.name() == topic) else {
                return Ok(TopicHealth {
                    error: Some("topic not present in metadata".to_string()),
                    topic,
                    partitions: Vec::new(),
                });
            };

            let brokers: Vec<i32> = metadata.brokers().iter().map(|b| b.id()).collect();
            let partitions = found
                .partitions()
                .iter()
                .map(|p| PartitionHealth {
                    partition: p.id(),
                    leader: Some(p.leader()).filter(|id| *id >= 0 && brokers.contains(id)),
                    error: p
                        .error()
                        .map(|code| RDKafkaErrorCode::from(code).to_string()),
                })
                .collect();

            Ok(TopicHealth {
                error: found
                    .error()
                    .map(|code| RDKafkaErrorCode::from(code).to_string()),
                topic,
                partitions,
            })
        })
        .await?
    }

    fn close(&self) -> BrokerResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::ClientClosed);
        }
        info!("Kafka client closed");
        Ok(())
    }
}
