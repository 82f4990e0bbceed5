use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{EventSink, SinkError};
use crate::event::StructuredEvent;

/// In-process sink that keeps every submitted event. Used by the test
/// suites and for running the pipeline without a telemetry backend.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<StructuredEvent>>,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StructuredEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventSink for MemorySink {
    fn submit(&self, event: StructuredEvent) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
