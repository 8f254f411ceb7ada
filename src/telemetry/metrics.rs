//! Receive-path counters.
//!
//! Lock-free counters shared between a session and whoever reports on it.

use crate::classifier::SkipReason;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Statistics for one receive session.
#[derive(Debug, Default)]
pub struct ReceiveStats {
    /// Frames handed over by the capture source.
    pub frames_read: Counter,
    /// Bytes in those frames.
    pub bytes_read: Counter,
    /// Frames the classifier skipped, any reason.
    pub frames_skipped: Counter,
    skipped_by_reason: [Counter; SkipReason::ALL.len()],
    /// Messages returned to the caller.
    pub messages_delivered: Counter,
    /// Payload bytes returned to the caller.
    pub bytes_delivered: Counter,
    /// Reads that failed with an I/O error (closing is not counted).
    pub read_errors: Counter,
}

impl ReceiveStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, len: usize) {
        self.frames_read.inc();
        self.bytes_read.add(len as u64);
    }

    pub fn record_skip(&self, reason: SkipReason) {
        self.frames_skipped.inc();
        self.skipped_by_reason[reason as usize].inc();
    }

    pub fn record_delivery(&self, len: usize) {
        self.messages_delivered.inc();
        self.bytes_delivered.add(len as u64);
    }

    pub fn record_read_error(&self) {
        self.read_errors.inc();
    }

    /// Frames skipped for `reason`.
    pub fn skipped(&self, reason: SkipReason) -> u64 {
        self.skipped_by_reason[reason as usize].get()
    }

    /// Exports all counters as key-value pairs, per-reason skips as
    /// `skipped_<reason>`.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("frames_read".into(), self.frames_read.get()),
            ("bytes_read".into(), self.bytes_read.get()),
            ("frames_skipped".into(), self.frames_skipped.get()),
            ("messages_delivered".into(), self.messages_delivered.get()),
            ("bytes_delivered".into(), self.bytes_delivered.get()),
            ("read_errors".into(), self.read_errors.get()),
        ];

        result.extend(
            SkipReason::ALL
                .iter()
                .map(|&reason| (format!("skipped_{}", reason), self.skipped(reason))),
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(10);
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn test_skip_reasons_counted_separately() {
        let stats = ReceiveStats::new();

        stats.record_skip(SkipReason::HandshakeProbe);
        stats.record_skip(SkipReason::HandshakeProbe);
        stats.record_skip(SkipReason::NoNetworkLayer);

        assert_eq!(stats.frames_skipped.get(), 3);
        assert_eq!(stats.skipped(SkipReason::HandshakeProbe), 2);
        assert_eq!(stats.skipped(SkipReason::NoNetworkLayer), 1);
        assert_eq!(stats.skipped(SkipReason::Malformed), 0);
    }

    #[test]
    fn test_export() {
        let stats = ReceiveStats::new();

        stats.record_frame(74);
        stats.record_frame(79);
        stats.record_skip(SkipReason::HandshakeProbe);
        stats.record_delivery(5);

        let metrics = stats.export();

        assert!(metrics.contains(&("frames_read".into(), 2)));
        assert!(metrics.contains(&("bytes_read".into(), 153)));
        assert!(metrics.contains(&("messages_delivered".into(), 1)));
        assert!(metrics.contains(&("bytes_delivered".into(), 5)));
        assert!(metrics.contains(&("skipped_handshake_probe".into(), 1)));
        assert!(metrics.contains(&("skipped_fragment".into(), 0)));
        assert_eq!(metrics.len(), 6 + SkipReason::ALL.len());
    }
}
