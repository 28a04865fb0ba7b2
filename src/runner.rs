//! Timed execution of a batch of invocations.
//!
//! Writes fan out concurrently on the calling task; reads run one after the
//! other and stop at the first failure. Both modes hand back outcomes in
//! invocation order and never leave work in flight after returning.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::error::Elapsed;
use crate::outcome::{InvocationFailure, InvocationOutcome, OperationKind};
use crate::timer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One at a time, stop issuing after the first failure.
    Sequential,
    /// Issue everything at once, wait for every invocation to settle.
    Concurrent,
}

impl ConcurrencyMode {
    /// Fixed benchmarking policy per operation kind.
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Write => ConcurrencyMode::Concurrent,
            OperationKind::Read | OperationKind::Store => ConcurrencyMode::Sequential,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct InvocationRunner {
    timeout: Option<Duration>,
}

impl InvocationRunner {
    /// `timeout` bounds each invocation; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn run<F, Fut, T, E>(
        &self,
        kind: OperationKind,
        count: usize,
        mode: ConcurrencyMode,
        invoke: F,
    ) -> Vec<InvocationOutcome>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<InvocationFailure>,
    {
        let invoke = &invoke;
        match mode {
            ConcurrencyMode::Concurrent => {
                // join_all keeps input order, so slot i always holds invocation i.
                join_all((0..count).map(|index| self.timed(kind, index, invoke))).await
            }
            ConcurrencyMode::Sequential => {
                let mut outcomes = Vec::with_capacity(count);
                for index in 0..count {
                    let outcome = self.timed(kind, index, invoke).await;
                    let failed = !outcome.is_success();
                    outcomes.push(outcome);
                    if failed {
                        debug!(%kind, index, remaining = count - index - 1, "stopping sequential batch");
                        break;
                    }
                }
                outcomes
            }
        }
    }

    async fn timed<F, Fut, T, E>(&self, kind: OperationKind, index: usize, invoke: &F) -> InvocationOutcome
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<InvocationFailure>,
    {
        let start = timer::start();
        let call = invoke(index);
        let result: Result<T, InvocationFailure> = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(r) => r.map_err(Into::into),
                Err(_) => Err(Elapsed(limit).into()),
            },
            None => call.await.map_err(Into::into),
        };
        let nanos = timer::elapsed_nanos(start);

        match result {
            Ok(_) => {
                debug!(%kind, index, nanos, "invocation completed");
                InvocationOutcome::success(index, nanos)
            }
            Err(failure) => {
                if failure.is_payload_too_large() {
                    error!(%kind, index, "payload is likely too large for this transaction: {failure}");
                } else {
                    warn!(%kind, index, "invocation failed: {failure}");
                }
                InvocationOutcome::failure(index, failure)
            }
        }
    }
}
