//! Randomized acknowledgment sequences against the ordered consumer.
//!
//! Each seed builds a topic with a random partition layout, consumes every
//! record, acknowledges a random prefix of the deliveries, then either
//! cancels or sends one out-of-order acknowledgment. Afterwards it checks
//! what the broker committed and what a fresh session redelivers.

#![allow(clippy::cast_possible_truncation)] // Partition counts are tiny.
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)] // Offsets in these runs are small and non-negative.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::properties::{check_ack_prefix, check_commit_order, check_one_commit_per_ack};
use crate::scenarios::{broker_with_topic, seeds, source, wait_until, ConsumeHarness, TOPIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Cancel,
    InvalidAck,
}

async fn run_seed(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);

    let partitions = rng.gen_range(1..=4u32);
    let broker = broker_with_topic(partitions);
    let mut total = 0usize;
    for partition in 0..partitions {
        for i in 0..rng.gen_range(0..6) {
            broker
                .append(TOPIC, partition as i32, format!("p{partition}-{i}"))
                .unwrap();
            total += 1;
        }
    }
    if total == 0 {
        broker.append(TOPIC, 0, "p0-0").unwrap();
        total = 1;
    }

    let mut harness = ConsumeHarness::start(source(&broker), total);
    let delivered = harness.deliveries(total).await;

    let accepted = rng.gen_range(0..=total);
    for message in &delivered[..accepted] {
        harness.ack(message).await;
    }

    let ending = if accepted + 1 < total && rng.gen_bool(0.5) {
        Ending::InvalidAck
    } else {
        Ending::Cancel
    };

    match ending {
        Ending::Cancel => {
            wait_until("accepted acks committed", || {
                broker.commit_log().len() == accepted
            })
            .await;
            let result = harness.cancel_and_finish().await;
            assert!(result.is_ok(), "seed {seed}: cancel returned {result:?}");
        }
        Ending::InvalidAck => {
            let stray = rng.gen_range(accepted + 1..total);
            harness.ack(&delivered[stray]).await;

            let err = harness.finish().await.unwrap_err();
            let invalid = err
                .as_invalid_ack()
                .unwrap_or_else(|| panic!("seed {seed}: expected InvalidAck, got {err}"));
            assert_eq!(invalid.acked, delivered[stray], "seed {seed}");
            assert_eq!(invalid.expected.as_ref(), Some(&delivered[accepted]), "seed {seed}");
        }
    }
    assert_eq!(broker.open_sessions(), 0, "seed {seed}: session leaked");

    // Commits are exactly the accepted prefix, in order.
    let commits = broker.commit_log();
    check_ack_prefix(&delivered, &delivered[..accepted])
        .unwrap_or_else(|v| panic!("seed {seed}: {v}"));
    check_one_commit_per_ack(accepted, &commits).unwrap_or_else(|v| panic!("seed {seed}: {v}"));
    check_commit_order(&commits).unwrap_or_else(|v| panic!("seed {seed}: {v}"));
    for (commit, message) in commits.iter().zip(&delivered) {
        let records = broker.records(TOPIC, commit.position.partition);
        let stored = &records[commit.position.offset as usize];
        assert_eq!(&stored.payload, message.payload(), "seed {seed}: wrong record committed");
    }

    // A fresh session redelivers exactly the unacknowledged messages.
    let remaining = total - accepted;
    let mut expected: Vec<Vec<u8>> = delivered[accepted..]
        .iter()
        .map(|m| m.data().to_vec())
        .collect();
    expected.sort();

    let mut fresh = ConsumeHarness::start(source(&broker), total);
    let mut redelivered: Vec<Vec<u8>> = fresh
        .deliveries(remaining)
        .await
        .iter()
        .map(|m| m.data().to_vec())
        .collect();
    redelivered.sort();
    assert_eq!(redelivered, expected, "seed {seed}: redelivery mismatch");
    assert!(fresh.cancel_and_finish().await.is_ok());
}

#[tokio::test]
async fn test_dst_consumer_random_ack_sequences() {
    for &seed in seeds::REGRESSION_SEEDS {
        run_seed(seed).await;
    }
}

#[tokio::test]
async fn test_dst_consumer_many_seeds() {
    for seed in 0..50 {
        run_seed(seed * 7919 + 3).await;
    }
}
