//! Submission metrics and reporting

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the submission pipeline. Cheap to share and update from
/// concurrent submissions.
#[derive(Debug, Default)]
pub struct SubmissionMetrics {
    submitted: AtomicU64,
    confirmed: AtomicU64,
    rejected: AtomicU64,
    unknown: AtomicU64,
    send_retries: AtomicU64,
    sequence_resyncs: AtomicU64,
}

impl SubmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirmed(&self) {
        self.confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown(&self) {
        self.unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sequence_resync(&self) {
        self.sequence_resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time view for logging and reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            sequence_resyncs: self.sequence_resyncs.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics values
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub confirmed: u64,
    pub rejected: u64,
    pub unknown: u64,
    pub send_retries: u64,
    pub sequence_resyncs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = SubmissionMetrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_confirmed();
        metrics.record_send_retry();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.confirmed, 1);
        assert_eq!(snapshot.rejected, 0);
        assert_eq!(snapshot.send_retries, 1);
    }
}
