//! Reusable test scenarios for Conduit.
//!
//! Harnesses run a publish or consume invocation on its own task and hand the
//! test the caller's ends of the channels, so tests read like the caller's
//! side of the protocol. Every wait is bounded by [`STEP_TIMEOUT`] so a hung
//! loop fails the test instead of stalling it.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{
    cancellation, AsyncMessageSink, AsyncMessageSource, CancelHandle, Message, Result,
};
use conduit_kafka::{KafkaSink, KafkaSource, SimulatedBroker};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Topic used by the standard scenarios.
pub const TOPIC: &str = "events";

/// Consumer group used by the standard scenarios.
pub const GROUP: &str = "conduit-tests";

/// Upper bound on any single wait in a scenario.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates a broker holding [`TOPIC`] with `partitions` partitions.
#[must_use]
pub fn broker_with_topic(partitions: u32) -> SimulatedBroker {
    let broker = SimulatedBroker::new();
    broker.create_topic(TOPIC, partitions);
    broker
}

/// Appends `payloads` to partition 0 of [`TOPIC`].
///
/// # Panics
///
/// Panics if the topic does not exist.
pub fn seed_records(broker: &SimulatedBroker, payloads: &[&str]) {
    for payload in payloads {
        broker
            .append(TOPIC, 0, (*payload).to_string())
            .expect("seed topic must exist");
    }
}

/// Creates a source over `broker` reading [`TOPIC`] as [`GROUP`].
#[must_use]
pub fn source(broker: &SimulatedBroker) -> Arc<KafkaSource<SimulatedBroker>> {
    Arc::new(KafkaSource::with_broker(
        Arc::new(broker.clone()),
        TOPIC,
        GROUP,
    ))
}

/// Creates an unkeyed sink over `broker` writing [`TOPIC`].
#[must_use]
pub fn sink(broker: &SimulatedBroker) -> Arc<KafkaSink<SimulatedBroker>> {
    Arc::new(KafkaSink::with_broker(Arc::new(broker.clone()), TOPIC, None))
}

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics if it does not hold within [`STEP_TIMEOUT`].
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(STEP_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

async fn join(task: JoinHandle<Result<()>>) -> Result<()> {
    tokio::time::timeout(STEP_TIMEOUT, task)
        .await
        .expect("operation did not return")
        .expect("operation task panicked")
}

// ============================================================================
// Consume
// ============================================================================

/// A consume invocation running in the background.
pub struct ConsumeHarness {
    /// Messages delivered by the source.
    pub deliveries: mpsc::Receiver<Message>,
    /// Acknowledgments sent back to the source.
    pub acks: mpsc::Sender<Message>,
    /// Cancels the invocation.
    pub cancel: CancelHandle,
    task: JoinHandle<Result<()>>,
}

impl ConsumeHarness {
    /// Starts consuming with room for `capacity` messages in each channel.
    #[must_use]
    pub fn start<S>(source: Arc<S>, capacity: usize) -> Self
    where
        S: AsyncMessageSource + 'static,
    {
        let (msg_tx, deliveries) = mpsc::channel(capacity);
        let (acks, ack_rx) = mpsc::channel(capacity);
        let (cancel, token) = cancellation();
        let task = tokio::spawn(async move { source.consume_messages(token, msg_tx, ack_rx).await });
        Self {
            deliveries,
            acks,
            cancel,
            task,
        }
    }

    /// Receives the next delivered message.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives in time or the source stopped delivering.
    pub async fn next_delivery(&mut self) -> Message {
        tokio::time::timeout(STEP_TIMEOUT, self.deliveries.recv())
            .await
            .expect("no delivery in time")
            .expect("delivery stream ended")
    }

    /// Receives `count` delivered messages.
    pub async fn deliveries(&mut self, count: usize) -> Vec<Message> {
        let mut delivered = Vec::with_capacity(count);
        for _ in 0..count {
            delivered.push(self.next_delivery().await);
        }
        delivered
    }

    /// Acknowledges a message.
    ///
    /// # Panics
    ///
    /// Panics if the source has stopped accepting acknowledgments.
    pub async fn ack(&self, message: &Message) {
        self.acks
            .send(message.clone())
            .await
            .expect("source stopped accepting acks");
    }

    /// Waits for the invocation to return.
    ///
    /// # Panics
    ///
    /// Panics if it does not return within [`STEP_TIMEOUT`].
    pub async fn finish(self) -> Result<()> {
        join(self.task).await
    }

    /// Cancels the invocation and waits for it to return.
    pub async fn cancel_and_finish(self) -> Result<()> {
        self.cancel.cancel();
        self.finish().await
    }

    /// Drops the acknowledgment stream and waits for the invocation to
    /// return.
    pub async fn drop_acks_and_finish(self) -> Result<()> {
        let Self { acks, task, .. } = self;
        drop(acks);
        join(task).await
    }
}

// ============================================================================
// Publish
// ============================================================================

/// A publish invocation running in the background.
pub struct PublishHarness {
    /// Messages handed to the sink.
    pub messages: mpsc::Sender<Message>,
    /// Acknowledgments returned by the sink.
    pub acks: mpsc::Receiver<Message>,
    /// Cancels the invocation.
    pub cancel: CancelHandle,
    task: JoinHandle<Result<()>>,
}

impl PublishHarness {
    /// Starts publishing with room for `capacity` messages in each channel.
    #[must_use]
    pub fn start<S>(sink: Arc<S>, capacity: usize) -> Self
    where
        S: AsyncMessageSink + 'static,
    {
        let (messages, msg_rx) = mpsc::channel(capacity);
        let (ack_tx, acks) = mpsc::channel(capacity);
        let (cancel, token) = cancellation();
        let task = tokio::spawn(async move { sink.publish_messages(token, ack_tx, msg_rx).await });
        Self {
            messages,
            acks,
            cancel,
            task,
        }
    }

    /// Hands a message to the sink.
    ///
    /// # Panics
    ///
    /// Panics if the sink has stopped reading.
    pub async fn send(&self, message: &Message) {
        self.messages
            .send(message.clone())
            .await
            .expect("sink stopped reading messages");
    }

    /// Receives the next acknowledgment.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives in time or the ack stream ended.
    pub async fn next_ack(&mut self) -> Message {
        tokio::time::timeout(STEP_TIMEOUT, self.acks.recv())
            .await
            .expect("no ack in time")
            .expect("ack stream ended")
    }

    /// Closes the input stream, waits for the invocation to return, and
    /// collects any acknowledgments still buffered.
    pub async fn close_input_and_finish(self) -> (Result<()>, Vec<Message>) {
        let Self {
            messages,
            acks,
            task,
            ..
        } = self;
        drop(messages);
        collect(task, acks).await
    }

    /// Cancels the invocation, waits for it to return, and collects any
    /// acknowledgments still buffered.
    pub async fn cancel_and_finish(self) -> (Result<()>, Vec<Message>) {
        self.cancel.cancel();
        self.finish().await
    }

    /// Waits for the invocation to return on its own.
    pub async fn finish(self) -> (Result<()>, Vec<Message>) {
        let Self {
            messages: _messages,
            acks,
            task,
            ..
        } = self;
        collect(task, acks).await
    }
}

async fn collect(
    task: JoinHandle<Result<()>>,
    mut acks: mpsc::Receiver<Message>,
) -> (Result<()>, Vec<Message>) {
    let result = join(task).await;
    let mut remaining = Vec::new();
    while let Some(message) = acks.recv().await {
        remaining.push(message);
    }
    (result, remaining)
}

/// Seeds for reproducible randomized runs.
pub mod seeds {
    /// Standard seeds run on every test invocation.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];
}
