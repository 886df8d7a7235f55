//! Concurrent batch dispatch with retry, split-on-overflow and cancellation.
//!
//! The dispatch loop pulls sealed batches in FIFO order and runs each under
//! one slot of a bounded in-flight window. Per batch, the submission protocol
//! is: submit, retry transient failures with capped exponential backoff and
//! jitter, split in half on a store-side `BatchTooLarge` rejection, and map
//! per-item outcomes positionally back onto the submitted operations. Splits
//! are processed through an explicit worklist rather than call-stack
//! recursion and reuse the parent batch's slot, so the in-flight window holds
//! even under pathological split storms.

use crate::batch::SealedBatch;
use crate::config::ExecutorConfig;
use crate::error::{FailureKind, OperationFailure, TransportError};
use crate::outcome::OperationResult;
use crate::transport::{BatchResponse, BatchTransport};
use core::time::Duration;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Pulls sealed batches and dispatches each on its own task, holding at most
/// `max_concurrent_batches` in flight. Batches arriving after cancellation,
/// or still queued for a slot when it fires, resolve as `Cancelled`.
pub(crate) async fn dispatch_loop<C: Send + Sync + 'static>(
    mut batches: mpsc::Receiver<SealedBatch<C>>,
    transport: Arc<dyn BatchTransport>,
    config: ExecutorConfig,
    cancel: CancellationToken,
    results: mpsc::Sender<OperationResult<C>>,
) {
    let slots = Arc::new(Semaphore::new(config.max_concurrent_batches));

    while let Some(batch) = batches.recv().await {
        if cancel.is_cancelled() {
            deliver_failure(batch, OperationFailure::cancelled(), &results).await;
            continue;
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                deliver_failure(batch, OperationFailure::cancelled(), &results).await;
                continue;
            }
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                // The semaphore is never closed while this loop runs.
                Err(_) => return,
            },
        };

        let transport = Arc::clone(&transport);
        let config = config.clone();
        let cancel = cancel.clone();
        let results = results.clone();

        tokio::spawn(async move {
            let _slot = permit;
            run_batch(batch, transport.as_ref(), &config, &cancel, &results).await;
        });
    }
}

/// Terminal verdict of [`submit_with_retry`] for one (sub-)batch.
enum AttemptOutcome {
    Response(BatchResponse),
    TooLarge,
    Terminal(String),
    Exhausted(String),
    Cancelled,
}

/// Runs one sealed batch to completion, including any splits it spawns.
#[tracing::instrument(skip_all, fields(partition = %batch.partition(), items = batch.len()))]
async fn run_batch<C>(
    batch: SealedBatch<C>,
    transport: &dyn BatchTransport,
    config: &ExecutorConfig,
    cancel: &CancellationToken,
    results: &mpsc::Sender<OperationResult<C>>,
) {
    let mut worklist = VecDeque::from([batch]);

    while let Some(batch) = worklist.pop_front() {
        match submit_with_retry(&batch, transport, config, cancel).await {
            AttemptOutcome::Response(response) if response.items.len() == batch.len() => {
                deliver_response(batch, response, results).await;
            }
            AttemptOutcome::Response(response) => {
                // The positional contract is broken; no outcome can be
                // trusted to belong to any particular item.
                tracing::error!(
                    submitted = batch.len(),
                    returned = response.items.len(),
                    "transport violated the one-outcome-per-item contract"
                );
                let failure = OperationFailure::new(
                    FailureKind::Transport { retryable: false },
                    format!(
                        "transport returned {} outcomes for {} submitted items",
                        response.items.len(),
                        batch.len()
                    ),
                );
                deliver_failure(batch, failure, results).await;
            }
            AttemptOutcome::TooLarge if batch.len() > 1 => {
                tracing::debug!(
                    items = batch.len(),
                    bytes = batch.byte_size(),
                    "store rejected batch as too large, splitting"
                );
                let (left, right) = batch.split();
                worklist.push_back(left);
                worklist.push_back(right);
            }
            AttemptOutcome::TooLarge => {
                let failure = OperationFailure::new(
                    FailureKind::Transport { retryable: false },
                    "store rejected a single-item batch as too large",
                );
                deliver_failure(batch, failure, results).await;
            }
            AttemptOutcome::Terminal(reason) => {
                let failure =
                    OperationFailure::new(FailureKind::Transport { retryable: false }, reason);
                deliver_failure(batch, failure, results).await;
            }
            AttemptOutcome::Exhausted(reason) => {
                let failure = OperationFailure::new(
                    FailureKind::RetryExhausted,
                    format!(
                        "gave up after {} retries: {reason}",
                        config.max_retry_attempts
                    ),
                );
                deliver_failure(batch, failure, results).await;
            }
            AttemptOutcome::Cancelled => {
                deliver_failure(batch, OperationFailure::cancelled(), results).await;
            }
        }
    }
}

/// Submits one batch, retrying transient failures until the retry budget is
/// spent. An attempt that has already reached the transport always runs to
/// completion; cancellation is honored between attempts and during backoff.
async fn submit_with_retry<C>(
    batch: &SealedBatch<C>,
    transport: &dyn BatchTransport,
    config: &ExecutorConfig,
    cancel: &CancellationToken,
) -> AttemptOutcome {
    let wire = batch.wire_items();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }
        attempt += 1;

        let error = match transport.submit(batch.partition(), &wire).await {
            Ok(response) => return AttemptOutcome::Response(response),
            Err(TransportError::BatchTooLarge) => return AttemptOutcome::TooLarge,
            Err(e @ TransportError::Terminal { .. }) => {
                return AttemptOutcome::Terminal(e.to_string());
            }
            Err(e @ TransportError::Retryable { .. }) => e,
        };

        // `attempt` counts submissions; retries beyond the initial attempt
        // draw from `max_retry_attempts`.
        if attempt > config.max_retry_attempts {
            return AttemptOutcome::Exhausted(error.to_string());
        }

        let delay = backoff_delay(config, attempt);
        tracing::debug!(
            partition = %batch.partition(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, backing off before retry"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return AttemptOutcome::Cancelled,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Exponential backoff for the given retry ordinal: base doubling per retry,
/// capped, then spread by a ±50% jitter factor to decorrelate clients.
fn backoff_delay(config: &ExecutorConfig, retry: u32) -> Duration {
    let doublings = (retry - 1).min(16);
    let exponential = config.backoff_base.saturating_mul(1u32 << doublings);
    let capped = exponential.min(config.backoff_cap);
    capped.mul_f64(0.5 + rand::random::<f64>())
}

/// Maps a positionally exact response back onto the batch's operations.
async fn deliver_response<C>(
    batch: SealedBatch<C>,
    response: BatchResponse,
    results: &mpsc::Sender<OperationResult<C>>,
) {
    for (op, outcome) in batch.into_items().into_iter().zip(response.items) {
        let result = if outcome.is_success() {
            Ok(outcome.into_response())
        } else {
            let status = outcome.status;
            let message = outcome
                .error
                .unwrap_or_else(|| format!("store rejected the item with status {status}"));
            Err(OperationFailure::with_status(
                FailureKind::Conditional,
                message,
                status,
            ))
        };

        let delivered = OperationResult {
            sequence_index: op.index,
            outcome: result,
            context: op.into_context(),
        };
        if results.send(delivered).await.is_err() {
            // Caller dropped the result stream; nothing left to deliver to.
            return;
        }
    }
}

/// Resolves every operation in `batch` with a copy of `failure`.
async fn deliver_failure<C>(
    batch: SealedBatch<C>,
    failure: OperationFailure,
    results: &mpsc::Sender<OperationResult<C>>,
) {
    for op in batch.into_items() {
        let delivered = OperationResult {
            sequence_index: op.index,
            outcome: Err(failure.clone()),
            context: op.into_context(),
        };
        if results.send(delivered).await.is_err() {
            return;
        }
    }
}
