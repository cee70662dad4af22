//! Partition selection for outgoing messages.
//!
//! The strategy is decided solely by whether the sink has a key function:
//! keyed messages hash to a stable partition, unkeyed messages rotate
//! through partitions in order.
//!
//! Every backend routes sends through [`PartitionSelector`], so a key lands
//! on the same partition with the rdkafka client as with the simulated
//! broker.

use xxhash_rust::xxh3::xxh3_64;

/// Partitioner strategy for selecting partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partitioner {
    /// Round-robin across partitions.
    #[default]
    RoundRobin,
    /// Hash the key to select a partition.
    KeyHash,
}

impl Partitioner {
    /// Returns the strategy for a sink with or without a key function.
    #[must_use]
    pub const fn for_keyed(keyed: bool) -> Self {
        if keyed {
            Self::KeyHash
        } else {
            Self::RoundRobin
        }
    }

    /// Returns the librdkafka `partitioner` setting for keyed sends.
    #[must_use]
    pub const fn librdkafka_name(self) -> &'static str {
        match self {
            // Sends carry an explicit partition, so this only applies if
            // librdkafka has to pick one itself.
            Self::RoundRobin => "consistent_random",
            Self::KeyHash => "murmur2_random",
        }
    }
}

/// Stateful partition selector for one producer session.
#[derive(Debug, Clone)]
pub struct PartitionSelector {
    partitioner: Partitioner,
    partition_count: u32,
    round_robin_counter: u64,
}

impl PartitionSelector {
    /// Creates a selector over `partition_count` partitions.
    #[must_use]
    pub const fn new(partitioner: Partitioner, partition_count: u32) -> Self {
        Self {
            partitioner,
            partition_count,
            round_robin_counter: 0,
        }
    }

    /// Returns the number of partitions selected over.
    #[must_use]
    pub const fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Selects a partition for a record with the given key.
    ///
    /// Keyless records under [`Partitioner::KeyHash`] fall back to
    /// round-robin.
    #[allow(clippy::cast_possible_truncation)] // Result is below partition_count.
    pub fn select(&mut self, key: Option<&[u8]>) -> i32 {
        if self.partition_count == 0 {
            return 0;
        }
        let count = u64::from(self.partition_count);

        let partition = match (self.partitioner, key) {
            (Partitioner::KeyHash, Some(key)) => xxh3_64(key) % count,
            _ => {
                let partition = self.round_robin_counter % count;
                self.round_robin_counter = self.round_robin_counter.wrapping_add(1);
                partition
            }
        };
        partition as i32
    }
}
