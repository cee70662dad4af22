//! Health reporting tests for sinks and sources sharing one broker client.

use std::sync::Arc;

use conduit_core::{AsyncMessageSink, AsyncMessageSource, Status};
use conduit_kafka::{KafkaSink, KafkaSource, SimulatedBroker};

use crate::scenarios::{broker_with_topic, GROUP, TOPIC};

fn pair(broker: &SimulatedBroker) -> (KafkaSink<SimulatedBroker>, KafkaSource<SimulatedBroker>) {
    let shared = Arc::new(broker.clone());
    (
        KafkaSink::with_broker(Arc::clone(&shared), TOPIC, None),
        KafkaSource::with_broker(shared, TOPIC, GROUP),
    )
}

#[tokio::test]
async fn test_status_all_partitions_led() {
    let broker = broker_with_topic(3);
    let (sink, source) = pair(&broker);

    assert_eq!(sink.status().await.unwrap(), Status::working());
    assert_eq!(source.status().await.unwrap(), Status::working());
}

#[tokio::test]
async fn test_status_leader_loss_degrades() {
    let broker = broker_with_topic(3);
    broker.set_leader(TOPIC, 1, None);
    let (sink, source) = pair(&broker);

    let status = sink.status().await.unwrap();
    assert!(!status.working);
    assert_eq!(status.problems.len(), 1);
    assert!(status.problems[0].contains("partition 1"));
    assert_eq!(source.status().await.unwrap(), status);

    // Recovery is seen on the next query; nothing is cached.
    broker.set_leader(TOPIC, 1, Some(2));
    assert!(sink.status().await.unwrap().working);
}

#[tokio::test]
async fn test_status_missing_topic_degrades() {
    let broker = SimulatedBroker::new();
    let (sink, _) = pair(&broker);

    let status = sink.status().await.unwrap();
    assert!(!status.working);
    assert!(status.problems[0].contains(TOPIC));
}

#[tokio::test]
async fn test_status_unreachable_is_error() {
    let broker = broker_with_topic(1);
    broker.set_unreachable(true);
    let (sink, source) = pair(&broker);

    assert!(sink.status().await.unwrap_err().is_broker());
    assert!(source.status().await.unwrap_err().is_broker());
}

#[tokio::test]
async fn test_status_after_close() {
    let broker = broker_with_topic(1);
    let (sink, source) = pair(&broker);

    // One client backs both, so closing through either closes it for both.
    AsyncMessageSink::close(&sink).unwrap();
    assert!(matches!(
        AsyncMessageSource::close(&source),
        Err(conduit_core::Error::Closed)
    ));
    assert!(matches!(
        source.status().await,
        Err(conduit_core::Error::Closed)
    ));
}
