//! Realtime change bus
//!
//! In-process pub/sub for ledger change notifications:
//! - Typed event envelope with subject-based routing
//! - Fire-and-forget emission (no acknowledgement, no delivery guarantee)
//! - Fan-out to every connected subscriber via a broadcast channel
//! - Observability via Prometheus metrics
//!
//! Emission never blocks and never fails: a bus with no subscribers
//! silently drops events, and a lagging subscriber loses the oldest
//! events rather than back-pressuring the emitter.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod broadcaster;
pub mod error;
pub mod event;
pub mod metrics;
pub mod types;

pub use broadcaster::{Broadcaster, Subscription};
pub use error::{Error, Result};
pub use event::ChangeEvent;
pub use types::{ChangeKind, ChangePayload};
