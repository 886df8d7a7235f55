//! The execution pipeline: validation → batching → dispatch → reassembly.
//!
//! [`BulkExecutor`] wires the pipeline stages together as spawned tasks
//! connected by bounded channels and hands the caller a result stream. Each
//! executor owns its own queues, counters and cancellation token; there is no
//! global state.

mod batcher;
mod dispatch;
mod reassemble;

use crate::batch::SealedBatch;
use crate::config::{ExecutorConfig, ExecutorOptions};
use crate::error::{OperationFailure, Result};
use crate::operation::{BulkOperation, SequencedOperation};
use crate::outcome::OperationResult;
use crate::transport::{BatchTransport, PartitionRouter};
use batcher::Batcher;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Bulk-operation execution engine.
///
/// Accepts a stream of [`BulkOperation`]s, groups them per physical partition
/// under the configured item and byte caps, dispatches groups concurrently
/// with retry and split-on-overflow, and yields exactly one
/// [`OperationResult`] per submitted operation.
///
/// ```no_run
/// # use docbulk::{BulkExecutor, BulkOperation, ExecutorOptions};
/// # use serde_json::json;
/// # async fn demo(
/// #     transport: std::sync::Arc<dyn docbulk::BatchTransport>,
/// #     router: std::sync::Arc<dyn docbulk::PartitionRouter>,
/// # ) -> anyhow::Result<()> {
/// use futures::StreamExt;
///
/// let executor = BulkExecutor::new(transport, router, ExecutorOptions::default())?;
/// let mut results = executor.execute_all(vec![
///     BulkOperation::create(json!({"id": "a", "tenant": "t1"}), "t1"),
///     BulkOperation::delete("b", "t1"),
/// ]);
/// while let Some(result) = results.next().await {
///     println!("#{}: {:?}", result.sequence_index, result.outcome);
/// }
/// # Ok(())
/// # }
/// ```
pub struct BulkExecutor {
    config: ExecutorConfig,
    transport: Arc<dyn BatchTransport>,
    router: Arc<dyn PartitionRouter>,
    cancel: CancellationToken,
}

impl BulkExecutor {
    /// Builds an executor over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](crate::ConfigError) when `options` carries a
    /// zero cap or an inverted backoff range. This is the only batch-wide
    /// error the engine ever raises; everything later resolves per item.
    pub fn new(
        transport: Arc<dyn BatchTransport>,
        router: Arc<dyn PartitionRouter>,
        options: ExecutorOptions,
    ) -> Result<Self> {
        Ok(Self {
            config: ExecutorConfig::try_from(options)?,
            transport,
            router,
            cancel: CancellationToken::new(),
        })
    }

    /// Signals cancellation to every running and future `execute` call.
    ///
    /// Operations not yet dispatched resolve as `Cancelled`; a batch whose
    /// transport call already started finishes that attempt and delivers its
    /// real outcomes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Executes a stream of operations, yielding one result per operation.
    ///
    /// Results carry the submission-order sequence index; with
    /// `strict_ordering` they are additionally delivered in that order. The
    /// returned stream backpressures the whole pipeline: a stalled consumer
    /// eventually stops new submissions from being read.
    pub fn execute<C, S>(&self, operations: S) -> impl Stream<Item = OperationResult<C>> + use<C, S>
    where
        C: Send + Sync + 'static,
        S: Stream<Item = BulkOperation<C>> + Send + 'static,
    {
        let (batch_tx, batch_rx) = mpsc::channel(self.config.max_concurrent_batches);
        let (completed_tx, completed_rx) = mpsc::channel(self.config.result_buffer_size);
        let (ordered_tx, ordered_rx) = mpsc::channel(self.config.result_buffer_size);

        let cancel = self.cancel.child_token();

        tokio::spawn(feed_batches(
            operations,
            Batcher::new(Arc::clone(&self.router), &self.config),
            batch_tx,
            completed_tx.clone(),
            cancel.clone(),
        ));

        tokio::spawn(dispatch::dispatch_loop(
            batch_rx,
            Arc::clone(&self.transport),
            self.config.clone(),
            cancel,
            completed_tx,
        ));

        tokio::spawn(reassemble::reassemble(
            completed_rx,
            ordered_tx,
            self.config.strict_ordering,
        ));

        ReceiverStream::new(ordered_rx)
    }

    /// Convenience wrapper over [`execute`](Self::execute) for operations
    /// already collected in memory.
    pub fn execute_all<C, I>(
        &self,
        operations: I,
    ) -> impl Stream<Item = OperationResult<C>> + use<C, I>
    where
        C: Send + Sync + 'static,
        I: IntoIterator<Item = BulkOperation<C>>,
        I::IntoIter: Send + 'static,
    {
        self.execute(futures::stream::iter(operations))
    }
}

/// Stage one: assign sequence indices, validate, size, and group the input
/// stream into sealed batches. Failures short-circuit straight to the result
/// channel without touching the batcher or the transport.
async fn feed_batches<C, S>(
    operations: S,
    mut batcher: Batcher<C>,
    batches: mpsc::Sender<SealedBatch<C>>,
    results: mpsc::Sender<OperationResult<C>>,
    cancel: CancellationToken,
) where
    C: Send + 'static,
    S: Stream<Item = BulkOperation<C>> + Send + 'static,
{
    let mut operations = core::pin::pin!(operations);
    let mut next_index: u64 = 0;

    while let Some(operation) = operations.next().await {
        let index = next_index;
        next_index += 1;

        if cancel.is_cancelled() {
            let cancelled = OperationResult {
                sequence_index: index,
                outcome: Err(OperationFailure::cancelled()),
                context: operation.into_context(),
            };
            if results.send(cancelled).await.is_err() {
                return;
            }
            continue;
        }

        let sequenced = match SequencedOperation::accept(index, operation) {
            Ok(sequenced) => sequenced,
            Err((operation, failure)) => {
                tracing::debug!(index, error = %failure, "rejecting operation before batching");
                let rejected = OperationResult {
                    sequence_index: index,
                    outcome: Err(failure),
                    context: operation.into_context(),
                };
                if results.send(rejected).await.is_err() {
                    return;
                }
                continue;
            }
        };

        match batcher.accept(sequenced) {
            Ok(None) => {}
            Ok(Some(sealed)) => {
                if batches.send(sealed).await.is_err() {
                    return;
                }
            }
            Err((sequenced, failure)) => {
                tracing::debug!(index = sequenced.index, error = %failure, "rejecting oversized operation");
                let rejected = OperationResult {
                    sequence_index: sequenced.index,
                    outcome: Err(failure),
                    context: sequenced.into_context(),
                };
                if results.send(rejected).await.is_err() {
                    return;
                }
            }
        }
    }

    for sealed in batcher.flush() {
        if batches.send(sealed).await.is_err() {
            return;
        }
    }
}
