//! Configuration for Kafka sinks and sources.
//!
//! [`SinkConfig`] and [`SourceConfig`] are the caller-facing surfaces. Both
//! lower into a [`BrokerConfig`], which holds everything the librdkafka
//! backend needs to open sessions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use conduit_core::Message;
use rdkafka::config::ClientConfig;

use crate::error::{BrokerError, BrokerResult};
use crate::partitioner::Partitioner;

/// Default interval between topic metadata refreshes.
pub const DEFAULT_METADATA_REFRESH: Duration = Duration::from_secs(10 * 60);

/// Default producer request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of producer retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default bound on flushing in-flight sends when a session closes.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for metadata queries.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Derives a partitioning key from a message.
pub type KeyFn = Arc<dyn Fn(&Message) -> Bytes + Send + Sync>;

/// Where a consumer group with no committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// The oldest message still retained by the broker.
    Oldest,
    /// Only messages produced after the group joins.
    #[default]
    Newest,
}

impl OffsetReset {
    /// Returns the librdkafka `auto.offset.reset` value.
    #[must_use]
    pub const fn librdkafka_name(self) -> &'static str {
        match self {
            Self::Oldest => "earliest",
            Self::Newest => "latest",
        }
    }
}

/// Acknowledgment level the producer waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequiredAcks {
    /// No acknowledgment (fire and forget).
    None,
    /// Wait for the partition leader.
    Leader,
    /// Wait for all in-sync replicas.
    #[default]
    All,
}

impl RequiredAcks {
    /// Returns the librdkafka `acks` value.
    #[must_use]
    pub const fn librdkafka_name(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }
}

/// Producer-side client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    /// Acknowledgment level.
    pub required_acks: RequiredAcks,
    /// Retries before a send is reported as failed.
    pub max_retries: u32,
    /// Broker request timeout.
    pub request_timeout: Duration,
    /// Largest message the producer will send, if overridden.
    pub max_message_bytes: Option<u32>,
    /// Bound on flushing in-flight sends at session close.
    pub close_timeout: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            required_acks: RequiredAcks::All,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_message_bytes: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Consumer-side client settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumerSettings {
    /// Initial offset policy for groups without a committed offset.
    pub offset_reset: OffsetReset,
    /// How long the broker keeps committed offsets, if overridden.
    pub offsets_retention: Option<Duration>,
}

/// Settings shared by every session opened from one broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Bootstrap broker addresses (`host:port`).
    pub brokers: Vec<String>,
    /// Broker protocol version to assume, e.g. `"2.8.0"`.
    pub version: Option<String>,
    /// Interval between topic metadata refreshes.
    pub metadata_refresh: Duration,
    /// Timeout for metadata queries.
    pub metadata_timeout: Duration,
    /// Producer settings.
    pub producer: ProducerSettings,
    /// Consumer settings.
    pub consumer: ConsumerSettings,
}

impl BrokerConfig {
    /// Creates a config with defaults for the given brokers.
    #[must_use]
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            version: None,
            metadata_refresh: DEFAULT_METADATA_REFRESH,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            producer: ProducerSettings::default(),
            consumer: ConsumerSettings::default(),
        }
    }

    /// Validates the shared settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no brokers are configured or one is blank.
    pub fn validate(&self) -> BrokerResult<()> {
        if self.brokers.is_empty() {
            return Err(BrokerError::invalid_config("at least one broker is required"));
        }
        if self.brokers.iter().any(|b| b.trim().is_empty()) {
            return Err(BrokerError::invalid_config("broker address must not be empty"));
        }
        if self.producer.max_message_bytes == Some(0) {
            return Err(BrokerError::invalid_config("max_message_bytes must be positive"));
        }
        Ok(())
    }

    /// Settings common to every librdkafka client.
    #[must_use]
    pub fn base_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set(
                "topic.metadata.refresh.interval.ms",
                self.metadata_refresh.as_millis().to_string(),
            );
        if let Some(version) = &self.version {
            config.set("broker.version.fallback", version);
        }
        config
    }

    /// Settings for a producer session.
    #[must_use]
    pub fn producer_client_config(&self, partitioner: Partitioner) -> ClientConfig {
        let mut config = self.base_client_config();
        config
            .set("acks", self.producer.required_acks.librdkafka_name())
            .set("message.send.max.retries", self.producer.max_retries.to_string())
            .set(
                "request.timeout.ms",
                self.producer.request_timeout.as_millis().to_string(),
            )
            .set("partitioner", partitioner.librdkafka_name());
        if let Some(max) = self.producer.max_message_bytes {
            config.set("message.max.bytes", max.to_string());
        }
        config
    }

    /// Settings for a consumer-group session.
    ///
    /// Offsets are only ever committed explicitly, one acknowledged record at
    /// a time.
    #[must_use]
    pub fn consumer_client_config(&self, group: &str) -> ClientConfig {
        let mut config = self.base_client_config();
        config
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", self.consumer.offset_reset.librdkafka_name());
        config
    }
}

/// Configuration for a Kafka sink.
#[derive(Clone, Default)]
pub struct SinkConfig {
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    /// Topic to publish to.
    pub topic: String,
    /// Largest message the producer will send, if overridden.
    pub max_message_bytes: Option<u32>,
    /// Derives a partitioning key. Without one, messages are spread
    /// round-robin.
    pub key_fn: Option<KeyFn>,
    /// Broker protocol version to assume.
    pub version: Option<String>,
}

impl SinkConfig {
    /// Creates a config for `topic` on `brokers`.
    #[must_use]
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, max: u32) -> Self {
        self.max_message_bytes = Some(max);
        self
    }

    /// Sets the key derivation function.
    #[must_use]
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Message) -> Bytes + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Sets the broker protocol version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the partitioning strategy implied by the key function.
    #[must_use]
    pub const fn partitioner(&self) -> Partitioner {
        Partitioner::for_keyed(self.key_fn.is_some())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic or broker list is empty.
    pub fn validate(&self) -> BrokerResult<()> {
        if self.topic.trim().is_empty() {
            return Err(BrokerError::invalid_config("topic is required"));
        }
        self.broker_config().validate()
    }

    /// Lowers into broker client settings.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        let mut config = BrokerConfig::new(self.brokers.clone());
        config.version.clone_from(&self.version);
        config.producer.max_message_bytes = self.max_message_bytes;
        config
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("brokers", &self.brokers)
            .field("topic", &self.topic)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<fn>"))
            .field("version", &self.version)
            .finish()
    }
}

/// Configuration for a Kafka source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceConfig {
    /// Consumer group whose committed offsets record progress.
    pub consumer_group: String,
    /// Topic to consume from.
    pub topic: String,
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    /// Initial offset policy.
    pub offset: OffsetReset,
    /// Metadata refresh interval; zero or `None` uses the default.
    pub metadata_refresh: Option<Duration>,
    /// How long the broker keeps committed offsets, if overridden.
    pub offsets_retention: Option<Duration>,
    /// Broker protocol version to assume.
    pub version: Option<String>,
}

impl SourceConfig {
    /// Creates a config for `topic` consumed by `consumer_group`.
    #[must_use]
    pub fn new(
        brokers: Vec<String>,
        topic: impl Into<String>,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            consumer_group: consumer_group.into(),
            ..Self::default()
        }
    }

    /// Sets the initial offset policy.
    #[must_use]
    pub const fn with_offset(mut self, offset: OffsetReset) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the metadata refresh interval.
    #[must_use]
    pub const fn with_metadata_refresh(mut self, interval: Duration) -> Self {
        self.metadata_refresh = Some(interval);
        self
    }

    /// Sets the committed offset retention.
    #[must_use]
    pub const fn with_offsets_retention(mut self, retention: Duration) -> Self {
        self.offsets_retention = Some(retention);
        self
    }

    /// Sets the broker protocol version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic, group or broker list is empty.
    pub fn validate(&self) -> BrokerResult<()> {
        if self.topic.trim().is_empty() {
            return Err(BrokerError::invalid_config("topic is required"));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(BrokerError::invalid_config("consumer group is required"));
        }
        self.broker_config().validate()
    }

    /// Lowers into broker client settings.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        let mut config = BrokerConfig::new(self.brokers.clone());
        config.version.clone_from(&self.version);
        if let Some(interval) = self.metadata_refresh.filter(|i| !i.is_zero()) {
            config.metadata_refresh = interval;
        }
        config.consumer.offset_reset = self.offset;
        config.consumer.offsets_retention = self.offsets_retention;
        config
    }
}
