//! Simulated broker for deterministic testing.
//!
//! This module provides an in-memory [`BrokerClient`] with partitioned,
//! offset-addressed topics, per-group committed offsets and configurable
//! fault injection. It is used by the integration tests and is public so
//! applications can exercise their own sink/source wiring without Kafka.
//!
//! Differences from a real cluster:
//! - Every consumer session is assigned every partition; there is no
//!   rebalancing between members of a group.
//! - Sends are stored synchronously unless acknowledgments are held with
//!   [`SimulatedBroker::hold_acks`].
//! - Client backpressure is modelled by [`SimulatedBroker::stall_sends`],
//!   which parks `send` until the stall is lifted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use conduit_core::Message;
use tokio::sync::Notify;
use tracing::debug;

use crate::broker::{
    BrokerClient, ConsumerEvent, ConsumerSession, PartitionHealth, Position, ProducerEventSender,
    ProducerEvents, ProducerSession, Record, SendRequest, TopicHealth,
};
use crate::config::OffsetReset;
use crate::error::{BrokerError, BrokerResult};
use crate::partitioner::{PartitionSelector, Partitioner};

/// Broker ID reported as the leader of every healthy simulated partition.
pub const SIMULATED_LEADER: i32 = 1;

/// A record stored in a simulated partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Partitioning key, if any.
    pub key: Option<Bytes>,
    /// Record value.
    pub payload: Bytes,
}

/// One offset commit observed by the simulated broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    /// Consumer group that committed.
    pub group: String,
    /// Topic the record belongs to.
    pub topic: String,
    /// Position of the committed record.
    pub position: Position,
}

#[derive(Debug)]
struct PartitionState {
    records: Vec<StoredRecord>,
    leader: Option<i32>,
}

#[derive(Debug)]
struct HeldSend {
    session: u64,
    topic: String,
    partition: i32,
    record: StoredRecord,
    token: Message,
    events: ProducerEventSender,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<PartitionState>>,
    /// Next offset to read, keyed by (group, topic, partition).
    committed: HashMap<(String, String, i32), i64>,
    commit_log: Vec<CommitEntry>,
    failing_sends: VecDeque<String>,
    failing_commits: VecDeque<String>,
    consumer_errors: VecDeque<String>,
    hold_acks: bool,
    held: Vec<HeldSend>,
    stall_sends: bool,
    stalled: usize,
    open_sessions: usize,
    next_session: u64,
    unreachable: bool,
    closed: bool,
}

impl State {
    fn ensure_usable(&self) -> BrokerResult<()> {
        if self.closed {
            return Err(BrokerError::ClientClosed);
        }
        if self.unreachable {
            return Err(BrokerError::unreachable("simulated network partition"));
        }
        Ok(())
    }

    fn partitions(&self, topic: &str) -> BrokerResult<&Vec<PartitionState>> {
        self.topics.get(topic).ok_or_else(|| BrokerError::TopicNotFound {
            topic: topic.to_string(),
        })
    }

    fn append(&mut self, topic: &str, partition: i32, record: StoredRecord) -> BrokerResult<Position> {
        let partitions = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: topic.to_string(),
            })?;
        let log = usize::try_from(partition)
            .ok()
            .and_then(|idx| partitions.get_mut(idx))
            .ok_or_else(|| BrokerError::TopicNotFound {
                topic: format!("{topic}/{partition}"),
            })?;
        let offset = i64::try_from(log.records.len()).unwrap_or(i64::MAX);
        log.records.push(record);
        Ok(Position::new(partition, offset))
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    appended: Notify,
    unstalled: Notify,
    offset_reset: OffsetReset,
}

/// In-memory broker with fault injection.
///
/// Cloning yields another handle to the same broker, so a test can keep one
/// handle for inspection while a sink or source owns another.
#[derive(Debug, Clone)]
pub struct SimulatedBroker {
    inner: Arc<Inner>,
}

impl Default for SimulatedBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBroker {
    /// Creates an empty broker. Groups without a committed offset start from
    /// the oldest record.
    #[must_use]
    pub fn new() -> Self {
        Self::with_offset_reset(OffsetReset::Oldest)
    }

    /// Creates an empty broker with the given initial offset policy.
    #[must_use]
    pub fn with_offset_reset(offset_reset: OffsetReset) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                appended: Notify::new(),
                unstalled: Notify::new(),
                offset_reset,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("simulated broker lock poisoned")
    }

    /// Creates `topic` with `partitions` empty, led partitions.
    pub fn create_topic(&self, topic: &str, partitions: u32) {
        let logs = (0..partitions)
            .map(|_| PartitionState {
                records: Vec::new(),
                leader: Some(SIMULATED_LEADER),
            })
            .collect();
        self.state().topics.insert(topic.to_string(), logs);
    }

    /// Appends a record directly, as if produced by another client.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic or partition does not exist.
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        payload: impl Into<Bytes>,
    ) -> BrokerResult<Position> {
        let position = self.state().append(
            topic,
            partition,
            StoredRecord {
                key: None,
                payload: payload.into(),
            },
        )?;
        self.inner.appended.notify_waiters();
        Ok(position)
    }

    /// Returns every record stored in a partition.
    #[must_use]
    pub fn records(&self, topic: &str, partition: i32) -> Vec<StoredRecord> {
        let state = self.state();
        state
            .topics
            .get(topic)
            .and_then(|partitions| usize::try_from(partition).ok().and_then(|i| partitions.get(i)))
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    /// Returns the payloads of every record in `topic`, partition by partition.
    #[must_use]
    pub fn payloads(&self, topic: &str) -> Vec<Bytes> {
        let state = self.state();
        state
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flat_map(|log| log.records.iter().map(|r| r.payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the next offset `group` will read from a partition, if it has
    /// committed one.
    #[must_use]
    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.state()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Returns every commit observed, in order.
    #[must_use]
    pub fn commit_log(&self) -> Vec<CommitEntry> {
        self.state().commit_log.clone()
    }

    /// Returns the number of sessions opened and not yet closed.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions
    }

    /// Returns true once [`BrokerClient::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    // ------------------------------------------------------------------
    // Fault injection.
    // ------------------------------------------------------------------

    /// The next send is reported as a delivery failure instead of stored.
    pub fn fail_next_send(&self, reason: impl Into<String>) {
        self.state().failing_sends.push_back(reason.into());
    }

    /// The next commit from any session fails.
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        self.state().failing_commits.push_back(reason.into());
    }

    /// The next `next_event` call on any consumer session yields an error.
    pub fn inject_consumer_error(&self, reason: impl Into<String>) {
        self.state().consumer_errors.push_back(reason.into());
        self.inner.appended.notify_waiters();
    }

    /// While enabled, sends are accepted but neither stored nor acknowledged
    /// until [`Self::release_held`] or the sending session closes.
    pub fn hold_acks(&self, hold: bool) {
        self.state().hold_acks = hold;
    }

    /// Returns the number of sends awaiting release.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.state().held.len()
    }

    /// Stores every held send and reports its success, in send order.
    pub fn release_held(&self) {
        let held = std::mem::take(&mut self.state().held);
        self.complete_held(held);
    }

    /// Reports every held send as a delivery failure, in send order.
    pub fn fail_held(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let held = std::mem::take(&mut self.state().held);
        for send in held {
            send.events.failure(BrokerError::Delivery {
                message: send.token.id(),
                reason: reason.clone(),
            });
        }
    }

    /// While enabled, `send` waits as if the client's queue were full.
    pub fn stall_sends(&self, stall: bool) {
        self.state().stall_sends = stall;
        if !stall {
            self.inner.unstalled.notify_waiters();
        }
    }

    /// Returns the number of sends currently waiting on a stall.
    #[must_use]
    pub fn stalled_sends(&self) -> usize {
        self.state().stalled
    }

    async fn wait_while_stalled(&self) {
        let _waiting = StalledSend::enter(self);
        loop {
            let unstalled = self.inner.unstalled.notified();
            tokio::pin!(unstalled);
            unstalled.as_mut().enable();

            let stalled = self.state().stall_sends;
            if !stalled {
                return;
            }
            unstalled.await;
        }
    }

    fn complete_held(&self, held: Vec<HeldSend>) {
        for send in held {
            let stored = self.state().append(&send.topic, send.partition, send.record);
            match stored {
                Ok(_) => send.events.success(send.token),
                Err(err) => send.events.failure(err),
            }
        }
        self.inner.appended.notify_waiters();
    }

    /// Sets or clears the leader of a partition.
    pub fn set_leader(&self, topic: &str, partition: i32, leader: Option<i32>) {
        let mut state = self.state();
        if let Some(log) = state
            .topics
            .get_mut(topic)
            .and_then(|partitions| usize::try_from(partition).ok().and_then(|i| partitions.get_mut(i)))
        {
            log.leader = leader;
        }
    }

    /// Makes the whole broker unreachable (or reachable again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }
}

/// Counts a send parked by [`SimulatedBroker::stall_sends`] for as long as
/// it waits, including when the waiting future is dropped.
struct StalledSend<'a> {
    broker: &'a SimulatedBroker,
}

impl<'a> StalledSend<'a> {
    fn enter(broker: &'a SimulatedBroker) -> Self {
        broker.state().stalled += 1;
        Self { broker }
    }
}

impl Drop for StalledSend<'_> {
    fn drop(&mut self) {
        let mut state = self.broker.state();
        state.stalled = state.stalled.saturating_sub(1);
    }
}

/// Producer session of a [`SimulatedBroker`].
#[derive(Debug)]
pub struct SimulatedProducerSession {
    broker: SimulatedBroker,
    id: u64,
    topic: String,
    selector: PartitionSelector,
    events: ProducerEventSender,
}

#[async_trait]
impl ProducerSession for SimulatedProducerSession {
    async fn send(&mut self, request: SendRequest) -> BrokerResult<()> {
        self.broker.wait_while_stalled().await;

        let partition = self.selector.select(request.key.as_deref());
        let record = StoredRecord {
            key: request.key,
            payload: request.payload,
        };

        let stored = {
            let mut state = self.broker.state();
            state.ensure_usable()?;

            if let Some(reason) = state.failing_sends.pop_front() {
                self.events.failure(BrokerError::Delivery {
                    message: request.token.id(),
                    reason,
                });
                return Ok(());
            }
            if state.hold_acks {
                state.held.push(HeldSend {
                    session: self.id,
                    topic: self.topic.clone(),
                    partition,
                    record,
                    token: request.token,
                    events: self.events.clone(),
                });
                return Ok(());
            }
            state.append(&self.topic, partition, record)
        };

        match stored {
            Ok(_) => {
                self.broker.inner.appended.notify_waiters();
                self.events.success(request.token);
            }
            Err(err) => self.events.failure(err),
        }
        Ok(())
    }

    async fn close(self) -> BrokerResult<()> {
        // Flush this session's held sends; they land even though nobody may
        // be listening for their acknowledgments any more.
        let held = {
            let mut state = self.broker.state();
            state.open_sessions = state.open_sessions.saturating_sub(1);
            let (mine, others) = std::mem::take(&mut state.held)
                .into_iter()
                .partition(|send| send.session == self.id);
            state.held = others;
            mine
        };
        self.broker.complete_held(held);
        debug!(topic = %self.topic, session = self.id, "Simulated producer session closed");
        Ok(())
    }
}

/// Consumer session of a [`SimulatedBroker`].
#[derive(Debug)]
pub struct SimulatedConsumerSession {
    broker: SimulatedBroker,
    topic: String,
    group: String,
    /// Next offset to read, per partition.
    positions: Vec<i64>,
    next_partition: usize,
}

impl SimulatedConsumerSession {
    /// Takes the next ready event without waiting.
    fn poll_event(&mut self) -> Option<ConsumerEvent> {
        let mut state = self.broker.state();
        if let Some(reason) = state.consumer_errors.pop_front() {
            return Some(ConsumerEvent::Error(BrokerError::Unreachable { message: reason }));
        }

        let partitions = state.topics.get(&self.topic)?;
        let count = self.positions.len().min(partitions.len());
        for step in 0..count {
            let idx = (self.next_partition + step) % count;
            let Ok(offset) = usize::try_from(self.positions[idx]) else {
                continue;
            };
            if let Some(stored) = partitions[idx].records.get(offset) {
                let position = Position::new(
                    i32::try_from(idx).unwrap_or(i32::MAX),
                    self.positions[idx],
                );
                self.positions[idx] += 1;
                self.next_partition = idx + 1;
                return Some(ConsumerEvent::Record(Record {
                    payload: stored.payload.clone(),
                    position,
                }));
            }
        }
        None
    }
}

#[async_trait]
impl ConsumerSession for SimulatedConsumerSession {
    async fn next_event(&mut self) -> ConsumerEvent {
        let broker = self.broker.clone();
        loop {
            // Register interest before checking so an append between the
            // check and the wait is not missed.
            let notified = broker.inner.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.poll_event() {
                return event;
            }
            notified.await;
        }
    }

    async fn commit(&mut self, position: Position) -> BrokerResult<()> {
        let mut state = self.broker.state();
        state.ensure_usable()?;
        if let Some(reason) = state.failing_commits.pop_front() {
            return Err(BrokerError::Unreachable { message: reason });
        }

        state.committed.insert(
            (self.group.clone(), self.topic.clone(), position.partition),
            position.next_offset(),
        );
        state.commit_log.push(CommitEntry {
            group: self.group.clone(),
            topic: self.topic.clone(),
            position,
        });
        Ok(())
    }

    async fn close(self) -> BrokerResult<()> {
        let mut state = self.broker.state();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        debug!(topic = %self.topic, group = %self.group, "Simulated consumer session closed");
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for SimulatedBroker {
    type Producer = SimulatedProducerSession;
    type Consumer = SimulatedConsumerSession;

    async fn open_producer(
        &self,
        topic: &str,
        partitioner: Partitioner,
    ) -> BrokerResult<(Self::Producer, ProducerEvents)> {
        let (id, partition_count) = {
            let mut state = self.state();
            state.ensure_usable()?;
            let count = u32::try_from(state.partitions(topic)?.len()).unwrap_or(u32::MAX);
            state.open_sessions += 1;
            state.next_session += 1;
            (state.next_session, count)
        };

        let (events_tx, events) = ProducerEventSender::channel();
        Ok((
            SimulatedProducerSession {
                broker: self.clone(),
                id,
                topic: topic.to_string(),
                selector: PartitionSelector::new(partitioner, partition_count),
                events: events_tx,
            },
            events,
        ))
    }

    async fn open_consumer(&self, topic: &str, group: &str) -> BrokerResult<Self::Consumer> {
        let positions = {
            let mut state = self.state();
            state.ensure_usable()?;
            let partitions = state.partitions(topic)?;
            let positions = partitions
                .iter()
                .enumerate()
                .map(|(idx, log)| {
                    let partition = i32::try_from(idx).unwrap_or(i32::MAX);
                    let key = (group.to_string(), topic.to_string(), partition);
                    state.committed.get(&key).copied().unwrap_or_else(|| {
                        match self.inner.offset_reset {
                            OffsetReset::Oldest => 0,
                            OffsetReset::Newest => i64::try_from(log.records.len()).unwrap_or(i64::MAX),
                        }
                    })
                })
                .collect();
            state.open_sessions += 1;
            positions
        };

        Ok(SimulatedConsumerSession {
            broker: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            positions,
            next_partition: 0,
        })
    }

    async fn topic_health(&self, topic: &str) -> BrokerResult<TopicHealth> {
        let state = self.state();
        state.ensure_usable()?;

        let Some(partitions) = state.topics.get(topic) else {
            return Ok(TopicHealth {
                topic: topic.to_string(),
                error: Some("UnknownTopicOrPartition".to_string()),
                partitions: Vec::new(),
            });
        };

        Ok(TopicHealth {
            topic: topic.to_string(),
            error: None,
            partitions: partitions
                .iter()
                .enumerate()
                .map(|(idx, log)| PartitionHealth {
                    partition: i32::try_from(idx).unwrap_or(i32::MAX),
                    leader: log.leader,
                    error: log.leader.is_none().then(|| "LeaderNotAvailable".to_string()),
                })
                .collect(),
        })
    }

    fn close(&self) -> BrokerResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(BrokerError::ClientClosed);
        }
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_producer_stores_and_acknowledges() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 2);

        let (mut session, mut events) = broker
            .open_producer("events", Partitioner::RoundRobin)
            .await
            .unwrap();
        let m1 = Message::new("a");
        let m2 = Message::new("b");
        session.send(SendRequest::new(m1.clone(), None)).await.unwrap();
        session.send(SendRequest::new(m2.clone(), None)).await.unwrap();

        assert_eq!(events.successes.recv().await, Some(m1));
        assert_eq!(events.successes.recv().await, Some(m2));
        assert_eq!(broker.records("events", 0).len(), 1);
        assert_eq!(broker.records("events", 1).len(), 1);

        assert_eq!(broker.open_sessions(), 1);
        session.close().await.unwrap();
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failed_send_reports_error() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        broker.fail_next_send("MessageSizeTooLarge");

        let (mut session, mut events) = broker
            .open_producer("events", Partitioner::RoundRobin)
            .await
            .unwrap();
        let message = Message::new("big");
        session.send(SendRequest::new(message.clone(), None)).await.unwrap();

        match events.errors.recv().await {
            Some(BrokerError::Delivery { message: id, reason }) => {
                assert_eq!(id, message.id());
                assert_eq!(reason, "MessageSizeTooLarge");
            }
            other => panic!("expected delivery error, got {other:?}"),
        }
        assert!(broker.records("events", 0).is_empty());
    }

    #[tokio::test]
    async fn test_held_sends_land_on_close() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        broker.hold_acks(true);

        let (mut session, mut events) = broker
            .open_producer("events", Partitioner::RoundRobin)
            .await
            .unwrap();
        session.send(SendRequest::new(Message::new("x"), None)).await.unwrap();
        assert_eq!(broker.held_count(), 1);
        assert!(events.successes.try_recv().is_err());
        assert!(broker.records("events", 0).is_empty());

        session.close().await.unwrap();
        assert_eq!(broker.held_count(), 0);
        assert_eq!(broker.records("events", 0).len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_send_waits_and_held_send_fails() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        broker.hold_acks(true);

        let (mut session, mut events) = broker
            .open_producer("events", Partitioner::RoundRobin)
            .await
            .unwrap();
        let first = Message::new("first");
        session.send(SendRequest::new(first.clone(), None)).await.unwrap();

        broker.stall_sends(true);
        let pending = tokio::spawn(async move {
            session.send(SendRequest::new(Message::new("second"), None)).await.unwrap();
            session
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.stalled_sends() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("send never stalled");
        assert_eq!(broker.held_count(), 1);

        broker.fail_held("NetworkException");
        match events.errors.recv().await {
            Some(BrokerError::Delivery { message, .. }) => assert_eq!(message, first.id()),
            other => panic!("expected delivery failure, got {other:?}"),
        }

        broker.stall_sends(false);
        let session = pending.await.unwrap();
        assert_eq!(broker.stalled_sends(), 0);
        assert_eq!(broker.held_count(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_resumes_from_committed_offset() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        for payload in ["a", "b", "c"] {
            broker.append("events", 0, payload).unwrap();
        }

        let mut session = broker.open_consumer("events", "g").await.unwrap();
        let ConsumerEvent::Record(first) = session.next_event().await else {
            panic!("expected record");
        };
        assert_eq!(first.position, Position::new(0, 0));
        session.commit(first.position).await.unwrap();
        session.close().await.unwrap();

        assert_eq!(broker.committed_offset("g", "events", 0), Some(1));

        let mut session = broker.open_consumer("events", "g").await.unwrap();
        let ConsumerEvent::Record(next) = session.next_event().await else {
            panic!("expected record");
        };
        assert_eq!(next.payload, Bytes::from_static(b"b"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_waits_for_appends() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        let mut session = broker.open_consumer("events", "g").await.unwrap();

        let appender = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            appender.append("events", 0, "late").unwrap();
        });

        let event = tokio::time::timeout(Duration::from_secs(2), session.next_event())
            .await
            .expect("append not observed");
        assert!(matches!(event, ConsumerEvent::Record(r) if r.payload == "late"));
    }

    #[tokio::test]
    async fn test_newest_offset_reset_skips_backlog() {
        let broker = SimulatedBroker::with_offset_reset(OffsetReset::Newest);
        broker.create_topic("events", 1);
        broker.append("events", 0, "old").unwrap();

        let mut session = broker.open_consumer("events", "g").await.unwrap();
        broker.append("events", 0, "new").unwrap();

        let ConsumerEvent::Record(record) = session.next_event().await else {
            panic!("expected record");
        };
        assert_eq!(record.payload, Bytes::from_static(b"new"));
        assert_eq!(record.position.offset, 1);
    }

    #[tokio::test]
    async fn test_topic_health_and_faults() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 2);
        broker.set_leader("events", 1, None);

        let health = broker.topic_health("events").await.unwrap();
        assert!(health.partitions[0].is_reachable());
        assert!(!health.partitions[1].is_reachable());

        let missing = broker.topic_health("nope").await.unwrap();
        assert!(missing.partitions.is_empty());
        assert!(missing.error.is_some());

        broker.set_unreachable(true);
        assert!(matches!(
            broker.topic_health("events").await,
            Err(BrokerError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_rejects_new_sessions() {
        let broker = SimulatedBroker::new();
        broker.create_topic("events", 1);

        broker.close().unwrap();
        assert!(matches!(broker.close(), Err(BrokerError::ClientClosed)));
        assert!(matches!(
            broker.open_consumer("events", "g").await,
            Err(BrokerError::ClientClosed)
        ));
    }
}
