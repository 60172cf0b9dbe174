//! Cumulative counters across every run of a pool.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PoolStats {
    runs_started: AtomicU64,
    jobs_processed: AtomicU64,
    results_delivered: AtomicU64,
    results_dropped: AtomicU64,
    job_panics: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub runs_started: u64,
    pub jobs_processed: u64,
    pub results_delivered: u64,
    pub results_dropped: u64,
    pub job_panics: u64,
}

impl PoolStats {
    pub(crate) fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn result_delivered(&self) {
        self.results_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn result_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn job_panicked(&self) {
        self.job_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            job_panics: self.job_panics.load(Ordering::Relaxed),
        }
    }
}
