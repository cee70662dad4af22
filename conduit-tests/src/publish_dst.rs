//! Randomized publish runs with injected send failures.
//!
//! Each seed publishes random batches over a random partition count and may
//! fail one send at a batch boundary. Every acknowledgment must name a sent
//! message exactly once, and nothing is acknowledged after the failure.

#![allow(clippy::cast_possible_wrap)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conduit_core::Message;

use crate::properties::check_publish_acks;
use crate::scenarios::{broker_with_topic, seeds, sink, PublishHarness, TOPIC};

async fn run_seed(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);

    let partitions = rng.gen_range(1..=4u32);
    let batches = rng.gen_range(1..=6usize);
    let fail_before = rng.gen_bool(0.5).then(|| rng.gen_range(0..batches));

    let broker = broker_with_topic(partitions);
    let mut harness = PublishHarness::start(sink(&broker), 16);
    let mut sent = Vec::new();
    let mut acked = Vec::new();

    for batch in 0..batches {
        if fail_before == Some(batch) {
            broker.fail_next_send("RecordListTooLarge");
            let doomed = Message::new(format!("doomed-{batch}"));
            harness.send(&doomed).await;
            sent.push(doomed.clone());

            let (result, rest) = harness.finish().await;
            let err = result.unwrap_err();
            assert!(err.is_broker(), "seed {seed}: {err}");
            assert!(
                err.to_string().contains(&doomed.id().to_string()),
                "seed {seed}: error does not name the failed message: {err}"
            );
            assert!(rest.is_empty(), "seed {seed}: ack after send error");
            check_publish_acks(&sent, &acked).unwrap_or_else(|v| panic!("seed {seed}: {v}"));
            assert_eq!(broker.payloads(TOPIC).len(), acked.len(), "seed {seed}");
            assert_eq!(broker.open_sessions(), 0, "seed {seed}");
            return;
        }

        let size = rng.gen_range(1..=8);
        let batch_messages: Vec<Message> = (0..size)
            .map(|i| Message::new(format!("b{batch}-{i}")))
            .collect();
        for message in &batch_messages {
            harness.send(message).await;
        }
        for _ in 0..size {
            acked.push(harness.next_ack().await);
        }
        sent.extend(batch_messages);
    }

    let (result, rest) = harness.close_input_and_finish().await;
    assert!(result.is_ok(), "seed {seed}: {result:?}");
    assert!(rest.is_empty());
    check_publish_acks(&sent, &acked).unwrap_or_else(|v| panic!("seed {seed}: {v}"));
    assert_eq!(acked.len(), sent.len(), "seed {seed}");

    // Round-robin keeps partitions within one record of each other.
    let counts: Vec<usize> = (0..partitions as i32)
        .map(|p| broker.records(TOPIC, p).len())
        .collect();
    let spread = counts.iter().max().unwrap() - counts.iter().min().unwrap();
    assert!(spread <= 1, "seed {seed}: uneven round-robin {counts:?}");
    assert_eq!(broker.open_sessions(), 0, "seed {seed}");
}

#[tokio::test]
async fn test_dst_publisher_random_batches() {
    for &seed in seeds::REGRESSION_SEEDS {
        run_seed(seed).await;
    }
}

#[tokio::test]
async fn test_dst_publisher_many_seeds() {
    for seed in 0..50 {
        run_seed(seed * 104_729 + 11).await;
    }
}
