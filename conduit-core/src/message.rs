//! Message handles exchanged between callers and sinks/sources.
//!
//! A [`Message`] is an opaque payload plus an identity. Identity is issued
//! when the handle is created and travels with every clone, so a sink can
//! hand the caller's own handle back on acknowledgment and a source can
//! verify that an acknowledgment names the message it delivered.
//!
//! Two messages built from identical bytes are distinct:
//!
//! ```
//! use conduit_core::Message;
//!
//! let a = Message::new("hello");
//! let b = Message::new("hello");
//! assert_ne!(a, b);
//! assert_eq!(a, a.clone());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::types::MessageId;

/// An opaque payload with handle identity.
#[derive(Clone)]
pub struct Message {
    id: MessageId,
    payload: Bytes,
}

impl Message {
    /// Creates a message with a freshly issued identity.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            id: MessageId::issue(),
            payload: payload.into(),
        }
    }

    /// Returns the identity of this handle.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the payload bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload as shared `Bytes`.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// Equality is identity, never content.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
