//! Ordered publisher integration tests.

use std::sync::Arc;

use bytes::Bytes;
use conduit_core::{AsyncMessageSink, Error, Message};
use conduit_kafka::{KafkaSink, KeyFn};

use crate::properties::check_publish_acks;
use crate::scenarios::{broker_with_topic, sink, wait_until, PublishHarness, TOPIC};

fn messages(count: usize) -> Vec<Message> {
    (0..count).map(|i| Message::new(format!("m{i}"))).collect()
}

// ============================================================================
// Acknowledgment Forwarding
// ============================================================================

#[tokio::test]
async fn test_sink_acks_each_stored_message_once() {
    let broker = broker_with_topic(3);
    let sent = messages(9);

    let mut harness = PublishHarness::start(sink(&broker), 16);
    for message in &sent {
        harness.send(message).await;
    }
    let mut acked = Vec::new();
    for _ in 0..sent.len() {
        acked.push(harness.next_ack().await);
    }

    let (result, rest) = harness.close_input_and_finish().await;
    assert!(result.is_ok());
    assert!(rest.is_empty());

    check_publish_acks(&sent, &acked).unwrap();
    assert_eq!(acked.len(), sent.len());
    assert_eq!(broker.payloads(TOPIC).len(), 9);
    for partition in 0..3 {
        assert_eq!(broker.records(TOPIC, partition).len(), 3);
    }
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_sink_acks_keep_identity() {
    let broker = broker_with_topic(1);

    let mut harness = PublishHarness::start(sink(&broker), 4);
    let first = Message::new("same");
    let second = Message::new("same");
    harness.send(&first).await;
    harness.send(&second).await;

    assert_eq!(harness.next_ack().await, first);
    assert_eq!(harness.next_ack().await, second);
    let (result, _) = harness.close_input_and_finish().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_sink_slow_ack_reader_does_not_block_sends() {
    let broker = broker_with_topic(2);

    // Nobody reads acks and the ack channel holds one, so the forwarder
    // stalls while sends keep flowing.
    let harness = PublishHarness::start(sink(&broker), 1);
    for message in &messages(10) {
        harness.send(message).await;
    }
    wait_until("all messages stored", || broker.payloads(TOPIC).len() == 10).await;

    let (result, acked) = harness.cancel_and_finish().await;
    assert!(result.is_ok());
    assert!(acked.len() <= 1);
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_sink_keyed_messages_route_by_key() {
    let broker = broker_with_topic(4);
    let key_fn: KeyFn = Arc::new(|message: &Message| {
        Bytes::copy_from_slice(&message.data()[..1])
    });
    let sink = Arc::new(KafkaSink::with_broker(
        Arc::new(broker.clone()),
        TOPIC,
        Some(key_fn),
    ));

    let harness = PublishHarness::start(sink, 16);
    for payload in ["a1", "b1", "a2", "b2", "a3"] {
        harness.send(&Message::new(payload)).await;
    }
    let (result, acked) = harness.close_input_and_finish().await;
    assert!(result.is_ok());
    assert_eq!(acked.len(), 5);

    // Each key lands wholly in one partition, in send order.
    for (prefix, expected) in [(b'a', vec!["a1", "a2", "a3"]), (b'b', vec!["b1", "b2"])] {
        let holding: Vec<i32> = (0..4)
            .filter(|p| {
                broker
                    .records(TOPIC, *p)
                    .iter()
                    .any(|r| r.payload[0] == prefix)
            })
            .collect();
        assert_eq!(holding.len(), 1, "key {} spread over {holding:?}", prefix as char);

        let stored: Vec<Bytes> = broker
            .records(TOPIC, holding[0])
            .into_iter()
            .filter(|r| r.payload[0] == prefix)
            .map(|r| r.payload)
            .collect();
        assert_eq!(stored, expected);
    }
}

// ============================================================================
// Input Closure
// ============================================================================

#[tokio::test]
async fn test_sink_input_close_waits_for_acks() {
    let broker = broker_with_topic(1);
    broker.hold_acks(true);
    let sent = messages(3);

    let harness = PublishHarness::start(sink(&broker), 8);
    for message in &sent {
        harness.send(message).await;
    }
    wait_until("sends held", || broker.held_count() == 3).await;

    let PublishHarness {
        messages,
        acks,
        cancel: _cancel,
        ..
    } = harness;
    drop(messages);

    // Nothing acknowledged yet, so the publish is still draining.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(broker.open_sessions(), 1);

    broker.release_held();
    wait_until("session released", || broker.open_sessions() == 0).await;

    let mut acks = acks;
    let mut acked = Vec::new();
    while let Some(message) = acks.recv().await {
        acked.push(message);
    }
    assert_eq!(acked, sent);
}

#[tokio::test]
async fn test_sink_input_close_with_nothing_sent() {
    let broker = broker_with_topic(1);

    let harness = PublishHarness::start(sink(&broker), 1);
    let (result, acked) = harness.close_input_and_finish().await;
    assert!(result.is_ok());
    assert!(acked.is_empty());
    assert_eq!(broker.open_sessions(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_sink_cancel_flushes_without_acking() {
    let broker = broker_with_topic(1);
    broker.hold_acks(true);

    let harness = PublishHarness::start(sink(&broker), 8);
    for message in &messages(2) {
        harness.send(message).await;
    }
    wait_until("sends held", || broker.held_count() == 2).await;

    let (result, acked) = harness.cancel_and_finish().await;
    assert!(result.is_ok());
    // In-flight sends land when the session closes, but are not acknowledged.
    assert!(acked.is_empty());
    assert_eq!(broker.held_count(), 0);
    assert_eq!(broker.payloads(TOPIC).len(), 2);
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_sink_ack_stream_dropped() {
    let broker = broker_with_topic(1);

    let mut harness = PublishHarness::start(sink(&broker), 4);
    harness.acks.close();
    harness.send(&Message::new("m0")).await;

    let (result, acked) = harness.finish().await;
    assert!(result.is_ok());
    assert!(acked.is_empty());
    assert_eq!(broker.payloads(TOPIC).len(), 1);
    assert_eq!(broker.open_sessions(), 0);
}

// ============================================================================
// Broker Failures
// ============================================================================

#[tokio::test]
async fn test_sink_send_error_stops_acks() {
    let broker = broker_with_topic(1);
    let sent = messages(2);

    let mut harness = PublishHarness::start(sink(&broker), 8);
    harness.send(&sent[0]).await;
    assert_eq!(harness.next_ack().await, sent[0]);

    broker.fail_next_send("MessageSizeTooLarge");
    harness.send(&sent[1]).await;

    let (result, rest) = harness.finish().await;
    let err = result.unwrap_err();
    assert!(err.is_broker());
    assert!(err.to_string().contains(&sent[1].id().to_string()));
    // Nothing is acknowledged after the failure.
    assert!(rest.is_empty());
    assert_eq!(broker.payloads(TOPIC).len(), 1);
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_sink_unreachable_broker() {
    let broker = broker_with_topic(1);
    broker.set_unreachable(true);

    let harness = PublishHarness::start(sink(&broker), 1);
    let (result, _) = harness.finish().await;
    assert!(result.unwrap_err().is_broker());
}

#[tokio::test]
async fn test_sink_closed_client() {
    let broker = broker_with_topic(1);
    let sink = sink(&broker);
    sink.close().unwrap();
    assert!(matches!(sink.close(), Err(Error::Closed)));

    let harness = PublishHarness::start(sink, 1);
    let (result, _) = harness.finish().await;
    assert!(matches!(result, Err(Error::Closed)));
}

// ============================================================================
// Shared Client
// ============================================================================

#[tokio::test]
async fn test_sink_concurrent_publishes_own_sessions() {
    let broker = broker_with_topic(2);
    let sink = sink(&broker);

    let mut first = PublishHarness::start(Arc::clone(&sink), 4);
    let mut second = PublishHarness::start(Arc::clone(&sink), 4);
    let a = Message::new("a");
    let b = Message::new("b");
    first.send(&a).await;
    second.send(&b).await;

    assert_eq!(first.next_ack().await, a);
    assert_eq!(second.next_ack().await, b);
    assert_eq!(broker.open_sessions(), 2);

    let (r1, _) = first.close_input_and_finish().await;
    let (r2, _) = second.close_input_and_finish().await;
    assert!(r1.is_ok() && r2.is_ok());
    assert_eq!(broker.open_sessions(), 0);
}
