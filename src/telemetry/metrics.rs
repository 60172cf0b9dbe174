//! Metric instrument factories for vidpool.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"vidpool"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for vidpool instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("vidpool")
}

/// Counter: pool runs started.
pub fn pool_runs() -> Counter<u64> {
    meter()
        .u64_counter("vidpool.pool.runs")
        .with_description("Number of worker pool runs started")
        .build()
}

/// Counter: jobs handed to the processor.
/// Labels: `outcome` ("ok" | "panic").
pub fn pool_jobs() -> Counter<u64> {
    meter()
        .u64_counter("vidpool.pool.jobs")
        .with_description("Number of jobs processed by pool workers")
        .build()
}

/// Counter: computed results discarded because the run ended first.
/// Labels: `reason` ("stopped" | "cancelled" | "output_closed").
pub fn pool_results_dropped() -> Counter<u64> {
    meter()
        .u64_counter("vidpool.pool.results_dropped")
        .with_description("Results computed but never delivered")
        .build()
}

/// Counter: panics caught inside a processor.
/// Labels: `recovered` (bool).
pub fn pool_job_panics() -> Counter<u64> {
    meter()
        .u64_counter("vidpool.pool.job_panics")
        .with_description("Panics caught while processing a job")
        .build()
}

/// Histogram: per-job processing time in milliseconds.
pub fn pool_job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("vidpool.pool.job_duration_ms")
        .with_description("Job processing duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: finished video conversions.
/// Labels: `result` ("ok" | "error").
pub fn video_conversions() -> Counter<u64> {
    meter()
        .u64_counter("vidpool.video.conversions")
        .with_description("Number of video conversions finished")
        .build()
}
