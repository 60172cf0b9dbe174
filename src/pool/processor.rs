//! The processing contract workers invoke for every job.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Maps one job to one result.
///
/// Every worker of a run shares the same processor and calls it without
/// any extra synchronization, so implementations must tolerate concurrent
/// invocation. Failures are the implementation's business: encode them in
/// `R`, the pool never looks inside.
#[async_trait]
pub trait Processor<J, R>: Send + Sync + 'static {
    /// Process a single job. `cancel` is the caller's run-wide token.
    async fn process(&self, cancel: CancellationToken, job: J) -> R;

    /// Turn a caught panic into a result to publish instead.
    ///
    /// Returning `None` drops the job: nothing is published, the fault is
    /// still counted and reported to the event sink.
    fn on_panic(&self, _fault: &JobFault) -> Option<R> {
        None
    }
}

/// A panic caught while processing a single job.
#[derive(Debug, Clone)]
pub struct JobFault {
    pub worker_id: usize,
    pub message: String,
}

impl JobFault {
    pub(crate) fn from_payload(worker_id: usize, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { worker_id, message }
    }
}

/// Processor backed by an async closure. See [`processor_fn`].
pub struct FnProcessor<F, J, R> {
    f: F,
    _marker: PhantomData<fn(J) -> R>,
}

/// Wrap `Fn(CancellationToken, J) -> impl Future<Output = R>` as a [`Processor`].
pub fn processor_fn<F, Fut, J, R>(f: F) -> FnProcessor<F, J, R>
where
    F: Fn(CancellationToken, J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    J: Send + 'static,
    R: Send + 'static,
{
    FnProcessor {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, J, R> Processor<J, R> for FnProcessor<F, J, R>
where
    F: Fn(CancellationToken, J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    J: Send + 'static,
    R: Send + 'static,
{
    async fn process(&self, cancel: CancellationToken, job: J) -> R {
        (self.f)(cancel, job).await
    }
}
