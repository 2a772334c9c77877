// Performance metrics module
//
// Lightweight counters for dispatch and capture activity

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Dispatch and capture metrics
///
/// Uses atomic operations so the affinity thread, callers and drain loops can
/// record without locks. Share one instance through an `Arc` and log it on
/// shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Tasks handed to the affinity thread through its queue
    pub tasks_dispatched: AtomicU64,

    /// Tasks run in place because the caller already was the affinity thread
    pub tasks_inline: AtomicU64,

    /// Tasks that returned their typed error
    pub task_failures: AtomicU64,

    /// Tasks that panicked
    pub task_panics: AtomicU64,

    /// Waits that ended without a result (executor closed or task discarded)
    pub dispatch_interruptions: AtomicU64,

    /// Drains and reads that ran to completion
    pub captures_completed: AtomicU64,

    /// Raw bytes read from streams
    pub bytes_captured: AtomicU64,

    /// Polls or read attempts that found no data
    pub stalls: AtomicU64,

    /// Channels that closed with a non-zero status
    pub non_zero_exits: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_dispatched: AtomicU64::new(0),
            tasks_inline: AtomicU64::new(0),
            task_failures: AtomicU64::new(0),
            task_panics: AtomicU64::new(0),
            dispatch_interruptions: AtomicU64::new(0),
            captures_completed: AtomicU64::new(0),
            bytes_captured: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
            non_zero_exits: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_dispatched(&self) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_inline(&self) {
        self.tasks_inline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failure(&self) {
        self.task_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_panic(&self) {
        self.task_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_interruption(&self) {
        self.dispatch_interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_completed(&self) {
        self.captures_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, count: usize) {
        self.bytes_captured.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_non_zero_exit(&self) {
        self.non_zero_exits.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Share of executed tasks that had to cross threads, in `0.0..=1.0`
    pub fn dispatch_ratio(&self) -> f64 {
        let dispatched = self.tasks_dispatched.load(Ordering::Relaxed);
        let inline = self.tasks_inline.load(Ordering::Relaxed);
        let total = dispatched + inline;
        if total > 0 {
            dispatched as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Stagehand Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} dispatched, {} inline ({:.0}% cross-thread), {} failed, {} panicked, {} interrupted",
            self.tasks_dispatched.load(Ordering::Relaxed),
            self.tasks_inline.load(Ordering::Relaxed),
            self.dispatch_ratio() * 100.0,
            self.task_failures.load(Ordering::Relaxed),
            self.task_panics.load(Ordering::Relaxed),
            self.dispatch_interruptions.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Captures: {} completed, {} bytes, {} stalls, {} non-zero exits",
            self.captures_completed.load(Ordering::Relaxed),
            self.bytes_captured.load(Ordering::Relaxed),
            self.stalls.load(Ordering::Relaxed),
            self.non_zero_exits.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
