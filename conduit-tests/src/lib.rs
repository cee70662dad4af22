//! Conduit Tests - Integration and simulation tests for Conduit.
//!
//! This crate drives `KafkaSink` and `KafkaSource` over the in-memory
//! `SimulatedBroker`, checking the ordered acknowledgment protocol end to end.
//! Tests are organized by component and type:
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): Seeded randomized runs with fault injection
//! - `ack_order_dst`: random acknowledgment sequences against the consumer
//! - `publish_dst`: random send failures against the publisher
//!
//! **Integration Tests** (`*_tests.rs`): Sink/source behavior over a broker
//! - `sink_tests`: publish, drain, cancellation and send failures
//! - `source_tests`: delivery, in-order commits, invalid acks, redelivery
//! - `status_tests`: health verdicts for both roles
//!
//! **Support Modules**:
//! - `properties`: Property checkers (`AckPrefix`, `CommitOrder`, etc.)
//! - `scenarios`: Harnesses around running publish and consume tasks
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

// DST test modules (seeded randomized runs).
#[cfg(test)]
mod ack_order_dst;
#[cfg(test)]
mod publish_dst;

// Integration test modules.
#[cfg(test)]
mod sink_tests;
#[cfg(test)]
mod status_tests;
