//! Kafka backend for Conduit.
//!
//! This crate implements [`conduit_core::AsyncMessageSink`] and
//! [`conduit_core::AsyncMessageSource`] over a partitioned, offset-addressed
//! broker, hiding partitions, offsets and consumer groups from callers.
//!
//! # Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`KafkaSink`] | Ordered publisher: sends messages, forwards broker acks |
//! | [`KafkaSource`] | Ordered consumer: delivers messages, commits acked offsets in order |
//! | [`InFlightLedger`] | FIFO of delivered, unacknowledged messages |
//! | [`BrokerClient`] | Seam to the broker; [`KafkaBroker`] or [`SimulatedBroker`] |
//! | [`topic_status`] | Partition/leader health aggregation |
//!
//! # Architecture
//!
//! ```text
//! caller ──messages──► KafkaSink ──► ProducerSession ──► Kafka
//!   ▲                     │ acks
//!   └─────────────────────┘
//!
//! Kafka ──► ConsumerSession ──► KafkaSource ──messages──► caller
//!              ▲ commit            │ ledger                │
//!              └───────────────────┴────────── acks ◄──────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod broker;
mod client;
pub mod config;
pub mod error;
mod ledger;
mod partitioner;
pub mod simulated;
mod sink;
mod source;
mod status;

pub use broker::{BrokerClient, ConsumerSession, Position, ProducerSession};
pub use client::{KafkaBroker, KafkaConsumerSession, KafkaProducerSession};
pub use config::{
    BrokerConfig, KeyFn, OffsetReset, RequiredAcks, SinkConfig, SourceConfig,
};
pub use error::{BrokerError, BrokerResult};
pub use ledger::InFlightLedger;
pub use partitioner::{PartitionSelector, Partitioner};
pub use simulated::SimulatedBroker;
pub use sink::KafkaSink;
pub use source::KafkaSource;
pub use status::{evaluate, topic_status};
