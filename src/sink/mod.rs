//! Transport layer for structured events.
//!
//! A sink is fire-and-forget: `submit` only enqueues and must never block
//! on network I/O, so a slow or dead backend cannot stall the audio path.
//! Delivery is at-most-once — failed events are logged and dropped, never
//! retried.

use thiserror::Error;

use crate::event::StructuredEvent;

pub mod honeycomb;
pub mod memory;

pub use honeycomb::HoneycombSink;
pub use memory::MemorySink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event buffer full, dropping event")]
    Saturated,
    #[error("sink is closed")]
    Closed,
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait EventSink: Send + Sync {
    /// Hand one event to the sink. Enqueue only; never blocks on the
    /// network.
    fn submit(&self, event: StructuredEvent) -> Result<(), SinkError>;

    /// Stop accepting events. Already-buffered events drain in the
    /// background; callers never wait on the backend. Safe to call more
    /// than once.
    fn close(&self);
}
