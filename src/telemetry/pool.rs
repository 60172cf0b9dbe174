//! Event sink that turns pool events into tracing events and OTel metrics.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};
use tracing::{Span, debug, error, info, warn};

use super::metrics;
use crate::pool::{EventSink, ExitReason, PoolEvent};

/// Logs every [`PoolEvent`] through `tracing` and records pool metrics.
///
/// `pool` names the pool in every event so several pools can share one
/// subscriber.
pub struct TracingSink {
    pool: &'static str,
    runs: Counter<u64>,
    jobs: Counter<u64>,
    dropped: Counter<u64>,
    panics: Counter<u64>,
    job_duration: Histogram<f64>,
}

impl TracingSink {
    pub fn new(pool: &'static str) -> Self {
        Self {
            pool,
            runs: metrics::pool_runs(),
            jobs: metrics::pool_jobs(),
            dropped: metrics::pool_results_dropped(),
            panics: metrics::pool_job_panics(),
            job_duration: metrics::pool_job_duration_ms(),
        }
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: PoolEvent) {
        let pool = self.pool;
        match event {
            PoolEvent::RunStarted { run_id, workers } => {
                self.runs.add(1, &[KeyValue::new("pool", pool)]);
                info!(pool, %run_id, workers, "pool run started");
            }
            PoolEvent::WorkerStarted { run_id, worker_id } => {
                debug!(pool, %run_id, worker_id, "worker started");
            }
            PoolEvent::JobCompleted {
                run_id,
                worker_id,
                elapsed,
            } => {
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                self.jobs.add(
                    1,
                    &[KeyValue::new("pool", pool), KeyValue::new("outcome", "ok")],
                );
                self.job_duration
                    .record(elapsed_ms, &[KeyValue::new("pool", pool)]);
                debug!(pool, %run_id, worker_id, elapsed_ms, "job completed");
            }
            PoolEvent::JobPanicked {
                run_id,
                worker_id,
                message,
                recovered,
            } => {
                self.jobs.add(
                    1,
                    &[KeyValue::new("pool", pool), KeyValue::new("outcome", "panic")],
                );
                self.panics.add(
                    1,
                    &[
                        KeyValue::new("pool", pool),
                        KeyValue::new("recovered", recovered),
                    ],
                );
                error!(pool, %run_id, worker_id, recovered, panic = %message, "job panicked");
            }
            PoolEvent::ResultDropped {
                run_id,
                worker_id,
                reason,
            } => {
                self.dropped.add(
                    1,
                    &[
                        KeyValue::new("pool", pool),
                        KeyValue::new("reason", reason.to_string()),
                    ],
                );
                warn!(pool, %run_id, worker_id, %reason, "result dropped");
            }
            PoolEvent::WorkerExited {
                run_id,
                worker_id,
                reason,
            } => match reason {
                ExitReason::InputClosed => {
                    debug!(pool, %run_id, worker_id, %reason, "worker exited")
                }
                _ => info!(pool, %run_id, worker_id, %reason, "worker exited"),
            },
            PoolEvent::StopRequested { run_id } => {
                record_state_transition(pool, &run_id.to_string(), "running", "stopped");
            }
            PoolEvent::RunDrained { run_id } => {
                info!(pool, %run_id, "pool run drained");
            }
            PoolEvent::Rejected { operation, state } => {
                warn!(pool, %operation, %state, "lifecycle call rejected");
            }
        }
    }
}

/// Start a span covering one run as seen by its consumer.
///
/// The pool's own events carry the run id; this span ties the consumer's
/// logs for the same batch together.
pub fn start_run_span(pool: &'static str, workers: usize) -> Span {
    tracing::info_span!("pool.run", pool, workers)
}

/// Emit a state transition event for a pool run.
pub fn record_state_transition(pool: &str, run_id: &str, from: &str, to: &str) {
    info!(pool, run_id, from, to, "state_transition");
}
