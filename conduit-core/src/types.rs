//! Strongly-typed identifiers for Conduit entities.
//!
//! Identifiers are issued from process-wide counters, so two values are equal
//! only when one was copied from the other. Message identity relies on this.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Macro to generate strongly-typed, counter-issued ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `MessageId` with `SessionId`)
/// - Debug/Display formatting
/// - A process-unique `issue()` constructor
macro_rules! define_id {
    ($name:ident, $counter:ident, $prefix:expr, $doc:expr) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Issues a new identifier, unique within this process.
            #[inline]
            #[must_use]
            pub fn issue() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(
    MessageId,
    NEXT_MESSAGE_ID,
    "msg",
    "Identity of a message handle. Clones of a message share it."
);
define_id!(
    SessionId,
    NEXT_SESSION_ID,
    "session",
    "Identifier of one publish or consume invocation, used in log spans."
);
