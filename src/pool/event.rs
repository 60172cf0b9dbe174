//! Structured events emitted by the pool.
//!
//! The pool never logs on its own. Every lifecycle step and every dropped
//! result is handed to the [`EventSink`] supplied at construction, and the
//! composition root decides where it goes.

use std::time::Duration;

use super::{PoolState, RunId};

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The run's stop signal fired.
    Stopped,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The input stream was closed and drained.
    InputClosed,
    /// The caller dropped the output stream. Idle workers notice while
    /// waiting for input; a busy worker notices when it tries to publish.
    OutputClosed,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::Stopped => "stopped",
            ExitReason::Cancelled => "cancelled",
            ExitReason::InputClosed => "input_closed",
            ExitReason::OutputClosed => "output_closed",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle operation named in a [`PoolEvent::Rejected`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Start => write!(f, "start"),
            Operation::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PoolEvent {
    RunStarted {
        run_id: RunId,
        workers: usize,
    },
    WorkerStarted {
        run_id: RunId,
        worker_id: usize,
    },
    JobCompleted {
        run_id: RunId,
        worker_id: usize,
        elapsed: Duration,
    },
    JobPanicked {
        run_id: RunId,
        worker_id: usize,
        message: String,
        recovered: bool,
    },
    /// A computed result was discarded because the run ended first.
    ResultDropped {
        run_id: RunId,
        worker_id: usize,
        reason: ExitReason,
    },
    WorkerExited {
        run_id: RunId,
        worker_id: usize,
        reason: ExitReason,
    },
    StopRequested {
        run_id: RunId,
    },
    /// All workers exited. The output stream closes right after.
    RunDrained {
        run_id: RunId,
    },
    /// `start` or `stop` called in the wrong state.
    Rejected {
        operation: Operation,
        state: PoolState,
    },
}

/// Destination for pool events. Called from worker tasks, so it must be
/// cheap and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PoolEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: PoolEvent) {}
}
