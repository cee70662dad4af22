//! Conduit Core - Transport-agnostic messaging contracts.
//!
//! This crate defines what callers of Conduit see: message handles with
//! identity, the sink and source traits, health status, cancellation, and the
//! error taxonomy. It knows nothing about partitions, offsets or consumer
//! groups; those live behind a backend such as `conduit-kafka`.
//!
//! # Design Principles
//!
//! - **Identity, not content**: messages compare by issued `MessageId`
//! - **Explicit errors**: every failure terminates the operation and is returned
//! - **Cancellation is success**: a cancelled operation returns `Ok(())`
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cancel;
mod error;
mod message;
mod sink;
mod source;
mod status;
mod types;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use error::{BoxError, Error, InvalidAckError, Result};
pub use message::Message;
pub use sink::AsyncMessageSink;
pub use source::AsyncMessageSource;
pub use status::Status;
pub use types::{MessageId, SessionId};
