//! Topic health aggregation shared by sinks and sources.

use conduit_core::{Result, Status};
use tracing::debug;

use crate::broker::{BrokerClient, TopicHealth};

/// Queries the broker for `topic` and reduces it to a single verdict.
///
/// The topic is working iff it has at least one partition and every
/// partition has a leader and no error.
///
/// # Errors
///
/// Returns an error if the broker cannot be reached at all; a reachable but
/// unhealthy topic is reported as [`Status::degraded`] instead.
pub async fn topic_status<B: BrokerClient>(broker: &B, topic: &str) -> Result<Status> {
    let health = broker.topic_health(topic).await?;
    let status = evaluate(&health);
    debug!(topic, %status, "Topic status evaluated");
    Ok(status)
}

/// Reduces topic health to a [`Status`].
#[must_use]
pub fn evaluate(health: &TopicHealth) -> Status {
    let mut problems = Vec::new();

    if let Some(err) = &health.error {
        problems.push(format!("topic {}: {err}", health.topic));
    } else if health.partitions.is_empty() {
        problems.push(format!("topic {} has no partitions", health.topic));
    }

    for partition in &health.partitions {
        match (&partition.error, partition.leader) {
            (Some(err), _) => problems.push(format!("partition {}: {err}", partition.partition)),
            (None, None) => problems.push(format!("partition {}: no leader", partition.partition)),
            (None, Some(_)) => {}
        }
    }

    if problems.is_empty() {
        Status::working()
    } else {
        Status::degraded(problems)
    }
}
