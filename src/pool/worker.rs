//! The per-run worker loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::RunId;
use super::event::{EventSink, ExitReason, PoolEvent};
use super::processor::{JobFault, Processor};
use super::stats::PoolStats;

/// One worker of one run. Consumed by [`Worker::run`].
pub(crate) struct Worker<J, R> {
    pub(crate) id: usize,
    pub(crate) run_id: RunId,
    pub(crate) processor: Arc<dyn Processor<J, R>>,
    pub(crate) input: async_channel::Receiver<J>,
    pub(crate) output: mpsc::Sender<R>,
    pub(crate) stop: CancellationToken,
    pub(crate) cancel: CancellationToken,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) stats: Arc<PoolStats>,
}

impl<J, R> Worker<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    pub(crate) async fn run(self) {
        self.sink.emit(PoolEvent::WorkerStarted {
            run_id: self.run_id,
            worker_id: self.id,
        });

        let reason = self.work_loop().await;

        self.sink.emit(PoolEvent::WorkerExited {
            run_id: self.run_id,
            worker_id: self.id,
            reason,
        });
    }

    async fn work_loop(&self) -> ExitReason {
        loop {
            // Stop wins over cancellation, cancellation wins over a ready job.
            let job = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return ExitReason::Stopped,
                _ = self.cancel.cancelled() => return ExitReason::Cancelled,
                _ = self.output.closed() => return ExitReason::OutputClosed,
                next = self.input.recv() => match next {
                    Ok(job) => job,
                    Err(_) => return ExitReason::InputClosed,
                },
            };

            let Some(result) = self.process(job).await else {
                continue;
            };

            // The result moves into the send future; losing the race drops it.
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    self.result_dropped(ExitReason::Stopped);
                    return ExitReason::Stopped;
                }
                _ = self.cancel.cancelled() => {
                    self.result_dropped(ExitReason::Cancelled);
                    return ExitReason::Cancelled;
                }
                sent = self.output.send(result) => {
                    if sent.is_err() {
                        self.result_dropped(ExitReason::OutputClosed);
                        return ExitReason::OutputClosed;
                    }
                    self.stats.result_delivered();
                }
            }
        }
    }

    /// Run the processor on one job, converting a panic into `on_panic`'s answer.
    async fn process(&self, job: J) -> Option<R> {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.processor.process(self.cancel.clone(), job))
            .catch_unwind()
            .await;
        self.stats.job_processed();

        match outcome {
            Ok(result) => {
                self.sink.emit(PoolEvent::JobCompleted {
                    run_id: self.run_id,
                    worker_id: self.id,
                    elapsed: started.elapsed(),
                });
                Some(result)
            }
            Err(payload) => {
                let fault = JobFault::from_payload(self.id, payload);
                let recovered = self.processor.on_panic(&fault);
                self.stats.job_panicked();
                self.sink.emit(PoolEvent::JobPanicked {
                    run_id: self.run_id,
                    worker_id: self.id,
                    message: fault.message,
                    recovered: recovered.is_some(),
                });
                recovered
            }
        }
    }

    fn result_dropped(&self, reason: ExitReason) {
        self.stats.result_dropped();
        self.sink.emit(PoolEvent::ResultDropped {
            run_id: self.run_id,
            worker_id: self.id,
            reason,
        });
    }
}
