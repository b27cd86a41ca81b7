//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Component runtime and lifecycle management."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

/// Snapshot of the activity counters of one component.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeMetrics {
    /// Deliveries taken from the inbox.
    pub received: u64,
    /// Envelopes handed to a handler slot (quit included).
    pub dispatched: u64,
    /// Deliveries discarded because they could not be decoded or had no slot.
    pub dropped: u64,
    /// Handler invocations that returned an error.
    pub handler_errors: u64,
    /// Individual publishes, one per destination.
    pub sent: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    received: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    handler_errors: AtomicU64,
    sent: AtomicU64,
}

impl Counters {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, count: usize) {
        self.sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RuntimeMetrics {
        RuntimeMetrics {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
        }
    }
}

impl RuntimeMetrics {
    /// Emit the counters as one structured event.
    pub fn log(&self, component: &str) {
        info!(
            component,
            received = self.received,
            dispatched = self.dispatched,
            dropped = self.dropped,
            handler_errors = self.handler_errors,
            sent = self.sent,
            "component metrics"
        );
    }
}
