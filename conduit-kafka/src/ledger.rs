//! In-flight ledger for the ordered consumer.
//!
//! The ledger records every message delivered to the caller, in delivery
//! order, until the caller acknowledges it. An acknowledgment is valid only
//! if it names the head of the ledger; only then is the head's position
//! committed and the head removed. Committed progress is therefore always a
//! strict prefix of what was delivered.
//!
//! The ledger is owned by a single consume loop and is never shared.

use std::collections::VecDeque;

use conduit_core::{InvalidAckError, Message};

use crate::broker::Position;

/// A delivered, unacknowledged message.
#[derive(Debug, Clone)]
struct InFlight {
    message: Message,
    position: Position,
}

/// FIFO of delivered-but-unacknowledged messages.
#[derive(Debug, Default)]
pub struct InFlightLedger {
    entries: VecDeque<InFlight>,
}

impl InFlightLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Appends a message that was just delivered to the caller.
    pub fn record_delivery(&mut self, message: Message, position: Position) {
        self.entries.push_back(InFlight { message, position });
    }

    /// Validates an acknowledgment against the head of the ledger.
    ///
    /// Returns the head's position, which must be committed before
    /// [`Self::pop_head`] is called. The ledger is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAckError`] if the ledger is empty or `acked` is not
    /// the head. Identity, not payload, is compared.
    pub fn check_ack(&self, acked: &Message) -> Result<Position, InvalidAckError> {
        match self.entries.front() {
            None => Err(InvalidAckError {
                acked: acked.clone(),
                expected: None,
            }),
            Some(head) if head.message != *acked => Err(InvalidAckError {
                acked: acked.clone(),
                expected: Some(head.message.clone()),
            }),
            Some(head) => Ok(head.position),
        }
    }

    /// Removes the head after its position has been committed.
    pub fn pop_head(&mut self) -> Option<Message> {
        self.entries.pop_front().map(|entry| entry.message)
    }

    /// Returns the message awaiting acknowledgment, if any.
    #[must_use]
    pub fn head(&self) -> Option<&Message> {
        self.entries.front().map(|entry| &entry.message)
    }

    /// Returns the number of unacknowledged messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing awaits acknowledgment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliver(ledger: &mut InFlightLedger, offset: i64) -> Message {
        let message = Message::new(format!("m{offset}"));
        ledger.record_delivery(message.clone(), Position::new(0, offset));
        message
    }

    #[test]
    fn test_ledger_in_order_acks() {
        let mut ledger = InFlightLedger::new();
        let m1 = deliver(&mut ledger, 10);
        let m2 = deliver(&mut ledger, 11);
        assert_eq!(ledger.len(), 2);

        assert_eq!(ledger.check_ack(&m1), Ok(Position::new(0, 10)));
        assert_eq!(ledger.pop_head(), Some(m1));
        assert_eq!(ledger.check_ack(&m2), Ok(Position::new(0, 11)));
        assert_eq!(ledger.pop_head(), Some(m2));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_rejects_out_of_order_ack() {
        let mut ledger = InFlightLedger::new();
        let m1 = deliver(&mut ledger, 0);
        let m2 = deliver(&mut ledger, 1);

        let err = ledger.check_ack(&m2).unwrap_err();
        assert_eq!(err.acked, m2);
        assert_eq!(err.expected, Some(m1.clone()));
        // Rejection leaves the ledger untouched.
        assert_eq!(ledger.head(), Some(&m1));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_ledger_rejects_ack_when_empty() {
        let ledger = InFlightLedger::new();
        let stray = Message::new("stray");

        let err = ledger.check_ack(&stray).unwrap_err();
        assert_eq!(err.acked, stray);
        assert_eq!(err.expected, None);
    }

    #[test]
    fn test_ledger_compares_identity_not_payload() {
        let mut ledger = InFlightLedger::new();
        let delivered = Message::new("same");
        ledger.record_delivery(delivered.clone(), Position::new(0, 0));

        let lookalike = Message::new("same");
        assert!(ledger.check_ack(&lookalike).is_err());
        assert!(ledger.check_ack(&delivered).is_ok());
    }
}
