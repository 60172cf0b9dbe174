//! Bounded worker pool: fans a fixed number of workers out over an input
//! stream and fans their results into a single output stream.
//!
//! A pool is built once and can run many times. Each [`WorkerPool::start`]
//! spawns a fresh batch of workers bound to a fresh stop signal; the run
//! ends when the input is exhausted, the caller's token is cancelled, or
//! [`WorkerPool::stop`] is called. The output stream closes only after the
//! last worker of the run has exited.

pub mod event;
pub mod processor;
pub mod stats;
mod worker;

pub use event::{EventSink, ExitReason, NoopSink, Operation, PoolEvent};
pub use processor::{FnProcessor, JobFault, Processor, processor_fn};
pub use stats::{PoolStats, StatsSnapshot};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::error::{Error, Result};
use worker::Worker;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// No run in progress. Initial state, and where every run ends.
    Idle,
    /// Workers are consuming the input stream.
    Running,
    /// `stop` was called and the run is draining. Collapses to `Idle`.
    Stopped,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PoolState::Idle => "idle",
            PoolState::Running => "running",
            PoolState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Identifies one start-to-drained run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolConfig {
    /// Workers spawned per run. Zero is treated as one.
    pub worker_count: usize,
    /// Capacity of the output stream. Zero is treated as one.
    pub result_buffer: usize,
    /// Where lifecycle and diagnostic events go.
    pub sink: Arc<dyn EventSink>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            result_buffer: 1,
            sink: Arc::new(NoopSink),
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("worker_count", &self.worker_count)
            .field("result_buffer", &self.result_buffer)
            .finish_non_exhaustive()
    }
}

impl PoolConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_result_buffer(mut self, capacity: usize) -> Self {
        self.result_buffer = capacity;
        self
    }

    /// Clamp a signed worker count (e.g. from the environment) to at least one.
    pub fn coerce_worker_count(n: i64) -> usize {
        if n <= 0 { 1 } else { n as usize }
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Handles shared by `stop` and the supervisor of one run.
#[derive(Clone)]
struct ActiveRun {
    id: RunId,
    stop: CancellationToken,
    workers: TaskTracker,
    /// Fired by the supervisor once the output stream is closed.
    drained: CancellationToken,
}

enum Lifecycle {
    Idle,
    Running(ActiveRun),
    Stopped(ActiveRun),
}

impl Lifecycle {
    fn state(&self) -> PoolState {
        match self {
            Lifecycle::Idle => PoolState::Idle,
            Lifecycle::Running(_) => PoolState::Running,
            Lifecycle::Stopped(_) => PoolState::Stopped,
        }
    }

    /// Return to idle, but only if `run_id` is still the current run.
    fn finish(&mut self, run_id: RunId) {
        let current = matches!(
            self,
            Lifecycle::Running(run) | Lifecycle::Stopped(run) if run.id == run_id
        );
        if current {
            *self = Lifecycle::Idle;
        }
    }
}

/// A reusable pool of `worker_count` workers mapping jobs `J` to results `R`.
pub struct WorkerPool<J, R> {
    processor: Arc<dyn Processor<J, R>>,
    worker_count: usize,
    result_buffer: usize,
    sink: Arc<dyn EventSink>,
    stats: Arc<PoolStats>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl<J, R> WorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    pub fn new(processor: impl Processor<J, R>, config: PoolConfig) -> Self {
        Self {
            processor: Arc::new(processor),
            worker_count: config.worker_count.max(1),
            result_buffer: config.result_buffer.max(1),
            sink: config.sink,
            stats: Arc::new(PoolStats::default()),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Idle)),
        }
    }

    /// Build a pool around an async closure.
    pub fn from_fn<F, Fut>(f: F, config: PoolConfig) -> Self
    where
        F: Fn(CancellationToken, J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        Self::new(processor_fn(f), config)
    }

    /// Begin a run over `input`, returning the stream results arrive on.
    ///
    /// Returns immediately. Results appear in completion order, not input
    /// order. The returned stream closes once every worker has exited, which
    /// happens when all senders of `input` are dropped and the queue is
    /// drained, when `cancel` fires, or when [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// [`Error::NotIdle`] if a run is already in progress. Nothing is
    /// spawned in that case.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        cancel: CancellationToken,
        input: async_channel::Receiver<J>,
    ) -> Result<mpsc::Receiver<R>> {
        let mut lifecycle = self.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            let state = lifecycle.state();
            drop(lifecycle);
            self.sink.emit(PoolEvent::Rejected {
                operation: Operation::Start,
                state,
            });
            return Err(Error::NotIdle(state));
        }

        let run = ActiveRun {
            id: RunId::new(),
            stop: CancellationToken::new(),
            workers: TaskTracker::new(),
            drained: CancellationToken::new(),
        };
        let (output, results) = mpsc::channel(self.result_buffer);
        *lifecycle = Lifecycle::Running(run.clone());
        self.stats.run_started();
        self.sink.emit(PoolEvent::RunStarted {
            run_id: run.id,
            workers: self.worker_count,
        });

        for id in 0..self.worker_count {
            let worker = Worker {
                id,
                run_id: run.id,
                processor: Arc::clone(&self.processor),
                input: input.clone(),
                output: output.clone(),
                stop: run.stop.clone(),
                cancel: cancel.clone(),
                sink: Arc::clone(&self.sink),
                stats: Arc::clone(&self.stats),
            };
            run.workers.spawn(worker.run());
        }
        run.workers.close();
        drop(lifecycle);

        let lifecycle = Arc::clone(&self.lifecycle);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            run.workers.wait().await;
            // Idle before the stream closes.
            lock(&lifecycle).finish(run.id);
            sink.emit(PoolEvent::RunDrained { run_id: run.id });
            // Last sender: dropping it closes the output stream.
            drop(output);
            run.drained.cancel();
        });

        Ok(results)
    }

    /// Stop the current run and wait for it to drain.
    ///
    /// Fires the run's stop signal, then returns only once every worker has
    /// exited and the output stream is closed. A result computed while the
    /// stop signal fired is dropped and counted in
    /// [`StatsSnapshot::results_dropped`].
    ///
    /// # Errors
    ///
    /// [`Error::NotRunning`] unless the pool is running.
    pub async fn stop(&self) -> Result<()> {
        let run = {
            let mut lifecycle = self.lock();
            let running = match &*lifecycle {
                Lifecycle::Running(run) => Some(run.clone()),
                _ => None,
            };
            let Some(run) = running else {
                let state = lifecycle.state();
                drop(lifecycle);
                self.sink.emit(PoolEvent::Rejected {
                    operation: Operation::Stop,
                    state,
                });
                return Err(Error::NotRunning(state));
            };
            *lifecycle = Lifecycle::Stopped(run.clone());
            run.stop.cancel();
            run
        };
        self.sink.emit(PoolEvent::StopRequested { run_id: run.id });

        run.workers.wait().await;
        run.drained.cancelled().await;
        self.lock().finish(run.id);
        Ok(())
    }

    /// True only while a run is in progress and `stop` has not been called.
    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), Lifecycle::Running(_))
    }

    pub fn state(&self) -> PoolState {
        self.lock().state()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }
}

impl<J, R> Drop for WorkerPool<J, R> {
    fn drop(&mut self) {
        // Workers of an abandoned run would otherwise wait on input forever.
        if let Lifecycle::Running(run) | Lifecycle::Stopped(run) = &*lock(&self.lifecycle) {
            run.stop.cancel();
        }
    }
}

/// The guarded section never panics, so a poisoned lock still holds valid state.
fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}
