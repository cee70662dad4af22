//! Property definitions and checkers for Conduit tests.
//!
//! Properties are invariants of the ordered acknowledgment protocol that
//! must hold for every run, whatever the interleaving or injected faults.

use std::collections::{HashMap, HashSet};

use conduit_core::{Message, MessageId};
use conduit_kafka::simulated::CommitEntry;

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of an ordered acknowledgment property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// An accepted acknowledgment did not follow delivery order.
    AckNotPrefix {
        /// Position in the acknowledgment sequence.
        index: usize,
        /// The message that was acknowledged.
        acked: MessageId,
        /// The message delivered at that position, if any.
        delivered: Option<MessageId>,
    },
    /// A partition's commits did not strictly increase.
    CommitOutOfOrder {
        /// Consumer group that committed.
        group: String,
        /// Partition that regressed.
        partition: i32,
        /// Offset committed before.
        previous: i64,
        /// Offset committed after.
        offset: i64,
    },
    /// Accepted acknowledgments and commits differ in number.
    CommitCountMismatch {
        /// Number of accepted acknowledgments.
        acks: usize,
        /// Number of commits observed.
        commits: usize,
    },
    /// The publisher acknowledged a message it was never given.
    UnknownAck {
        /// The acknowledged message.
        message: MessageId,
    },
    /// The publisher acknowledged a message more than once.
    DuplicateAck {
        /// The acknowledged message.
        message: MessageId,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AckNotPrefix {
                index,
                acked,
                delivered,
            } => match delivered {
                Some(delivered) => write!(
                    f,
                    "Ack {index} named {acked} but {delivered} was delivered at that position"
                ),
                None => write!(f, "Ack {index} named {acked} beyond the delivered sequence"),
            },
            Self::CommitOutOfOrder {
                group,
                partition,
                previous,
                offset,
            } => write!(
                f,
                "Group {group} committed partition {partition} at {offset} after {previous}"
            ),
            Self::CommitCountMismatch { acks, commits } => {
                write!(f, "{acks} accepted acks but {commits} commits")
            }
            Self::UnknownAck { message } => write!(f, "Ack for unsent message {message}"),
            Self::DuplicateAck { message } => write!(f, "Message {message} acknowledged twice"),
        }
    }
}

// ============================================================================
// Consume Path
// ============================================================================

/// Checks that `acked` is exactly a prefix of `delivered`, by identity.
///
/// # Errors
///
/// Returns the first position where the sequences diverge.
pub fn check_ack_prefix(delivered: &[Message], acked: &[Message]) -> Result<(), PropertyViolation> {
    for (index, ack) in acked.iter().enumerate() {
        let expected = delivered.get(index);
        if expected != Some(ack) {
            return Err(PropertyViolation::AckNotPrefix {
                index,
                acked: ack.id(),
                delivered: expected.map(Message::id),
            });
        }
    }
    Ok(())
}

/// Checks that commits strictly increase per (group, topic, partition).
///
/// # Errors
///
/// Returns the first commit that did not advance its partition.
pub fn check_commit_order(commits: &[CommitEntry]) -> Result<(), PropertyViolation> {
    let mut last: HashMap<(&str, &str, i32), i64> = HashMap::new();
    for commit in commits {
        let key = (
            commit.group.as_str(),
            commit.topic.as_str(),
            commit.position.partition,
        );
        if let Some(&previous) = last.get(&key) {
            if commit.position.offset <= previous {
                return Err(PropertyViolation::CommitOutOfOrder {
                    group: commit.group.clone(),
                    partition: commit.position.partition,
                    previous,
                    offset: commit.position.offset,
                });
            }
        }
        last.insert(key, commit.position.offset);
    }
    Ok(())
}

/// Checks that every accepted ack produced exactly one commit.
///
/// # Errors
///
/// Returns the counts when they differ.
pub const fn check_one_commit_per_ack(
    accepted_acks: usize,
    commits: &[CommitEntry],
) -> Result<(), PropertyViolation> {
    if accepted_acks == commits.len() {
        Ok(())
    } else {
        Err(PropertyViolation::CommitCountMismatch {
            acks: accepted_acks,
            commits: commits.len(),
        })
    }
}

// ============================================================================
// Publish Path
// ============================================================================

/// Checks that every publisher ack names a sent message, at most once.
///
/// # Errors
///
/// Returns the first unknown or repeated acknowledgment.
pub fn check_publish_acks(sent: &[Message], acked: &[Message]) -> Result<(), PropertyViolation> {
    let sent: HashSet<MessageId> = sent.iter().map(Message::id).collect();
    let mut seen = HashSet::new();
    for ack in acked {
        if !sent.contains(&ack.id()) {
            return Err(PropertyViolation::UnknownAck { message: ack.id() });
        }
        if !seen.insert(ack.id()) {
            return Err(PropertyViolation::DuplicateAck { message: ack.id() });
        }
    }
    Ok(())
}
