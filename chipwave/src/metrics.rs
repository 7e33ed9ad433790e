//! Render thread health monitoring and diagnostics
//!
//! The render callback never logs. It bumps relaxed atomic counters in
//! [`RenderMetrics`], and the control thread reports them once per second
//! through [`MetricsReporter::maybe_log`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

/// Counters written by the render thread
#[derive(Debug, Default)]
pub struct RenderMetrics {
    /// Render invocations
    pub callbacks: AtomicU64,
    /// Frames produced (including silence)
    pub frames_rendered: AtomicU64,
    /// Commands drained from the protocol
    pub commands_applied: AtomicU64,
    /// Seeks skipped because a later seek superseded them
    pub seeks_coalesced: AtomicU64,
    /// Loads that failed to decode
    pub load_failures: AtomicU64,
    /// Blocks where the decoder returned fewer bytes than requested
    pub short_blocks: AtomicU64,
}

impl RenderMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the counters into plain values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            seeks_coalesced: self.seeks_coalesced.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            short_blocks: self.short_blocks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RenderMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub callbacks: u64,
    pub frames_rendered: u64,
    pub commands_applied: u64,
    pub seeks_coalesced: u64,
    pub load_failures: u64,
    pub short_blocks: u64,
}

/// Control-side periodic reporter
pub struct MetricsReporter {
    metrics: Arc<RenderMetrics>,
    last: MetricsSnapshot,
    last_log_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<RenderMetrics>) -> Self {
        Self {
            metrics,
            last: MetricsSnapshot::default(),
            last_log_time: Instant::now(),
            interval: Duration::from_secs(1),
        }
    }

    pub fn metrics(&self) -> &Arc<RenderMetrics> {
        &self.metrics
    }

    /// Log per-interval deltas if enough time has passed
    pub fn maybe_log(&mut self, dropped_events: u64) {
        if self.last_log_time.elapsed() < self.interval {
            return;
        }
        let now = self.metrics.snapshot();
        debug!(
            "render metrics: callbacks={}, frames={}, commands={}, coalesced_seeks={}, \
             load_failures={}, short_blocks={}, dropped_events={}",
            now.callbacks - self.last.callbacks,
            now.frames_rendered - self.last.frames_rendered,
            now.commands_applied - self.last.commands_applied,
            now.seeks_coalesced - self.last.seeks_coalesced,
            now.load_failures - self.last.load_failures,
            now.short_blocks - self.last.short_blocks,
            dropped_events,
        );
        self.last = now;
        self.last_log_time = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = RenderMetrics::new();
        RenderMetrics::add(&metrics.callbacks, 3);
        RenderMetrics::add(&metrics.frames_rendered, 1536);
        RenderMetrics::add(&metrics.load_failures, 1);

        let snap = metrics.snapshot();
        assert_eq!(snap.callbacks, 3);
        assert_eq!(snap.frames_rendered, 1536);
        assert_eq!(snap.load_failures, 1);
        assert_eq!(snap.seeks_coalesced, 0);
    }

    #[test]
    fn test_reporter_tracks_last_snapshot() {
        let metrics = RenderMetrics::new();
        let mut reporter = MetricsReporter::new(metrics.clone());
        reporter.interval = Duration::ZERO;

        RenderMetrics::add(&metrics.callbacks, 5);
        reporter.maybe_log(0);
        assert_eq!(reporter.last.callbacks, 5);

        RenderMetrics::add(&metrics.callbacks, 2);
        reporter.maybe_log(0);
        assert_eq!(reporter.last.callbacks, 7);
    }
}
