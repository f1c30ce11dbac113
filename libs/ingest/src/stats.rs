use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between an ingest loop and its handle.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    appended: AtomicU64,
    decode_failures: AtomicU64,
    unroutable: AtomicU64,
    poll_errors: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of `IngestStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub appended: u64,
    pub decode_failures: u64,
    pub unroutable: u64,
    pub poll_errors: u64,
    pub reconnects: u64,
}

impl IngestStats {
    pub(crate) fn received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn appended(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
