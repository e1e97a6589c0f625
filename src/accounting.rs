//! Completion accounting for a batch.
//!
//! Every request unit increments the counter before sending and decrements it
//! only once the response has been fully consumed, so after the join barrier the
//! value is exactly the number of requests that were never confirmed.

use std::sync::atomic::{AtomicI64, Ordering};

/// Shared tally of requests sent but not yet confirmed.
#[derive(Debug, Default)]
pub struct OutstandingCounter {
    value: AtomicI64,
}

impl OutstandingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one request as sent. Returns the new outstanding value.
    pub fn increment(&self) -> i64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Marks one request as confirmed. Returns the new outstanding value.
    pub fn decrement(&self) -> i64 {
        self.value.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}
