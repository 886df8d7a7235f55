//! Groups the validated operation stream into sealed batches.
//!
//! One open batch exists per physical partition. Appending an operation that
//! would breach either cap seals the open batch downstream and starts a fresh
//! one, so a sealed batch never exceeds the configured limits. Routing is
//! consulted per operation and never cached beyond the open batch, which
//! makes mid-stream repartitioning safe: a key that starts resolving to a new
//! partition simply lands in a new open batch, and already-grouped items stay
//! where they are.

use crate::batch::{Batch, SealedBatch};
use crate::config::ExecutorConfig;
use crate::error::{FailureKind, OperationFailure};
use crate::operation::{PartitionId, SequencedOperation};
use crate::transport::PartitionRouter;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct Batcher<C> {
    router: Arc<dyn PartitionRouter>,
    max_items: usize,
    max_bytes: usize,
    open: HashMap<PartitionId, Batch<C>>,
}

impl<C> Batcher<C> {
    pub(crate) fn new(router: Arc<dyn PartitionRouter>, config: &ExecutorConfig) -> Self {
        Self {
            router,
            max_items: config.max_batch_items,
            max_bytes: config.max_batch_bytes,
            open: HashMap::new(),
        }
    }

    /// Routes `op` into its partition's open batch.
    ///
    /// Returns the previously open batch for that partition when appending
    /// `op` would breach a cap (the caller dispatches it), or an immediate
    /// failure when `op` can never fit a batch on its own.
    pub(crate) fn accept(
        &mut self,
        op: SequencedOperation<C>,
    ) -> Result<Option<SealedBatch<C>>, (SequencedOperation<C>, OperationFailure)> {
        if op.encoded_len > self.max_bytes {
            let failure = OperationFailure::new(
                FailureKind::PayloadTooLarge,
                format!(
                    "serialized operation is {} bytes, exceeding the {}-byte batch cap",
                    op.encoded_len, self.max_bytes
                ),
            );
            return Err((op, failure));
        }

        let partition = self.router.resolve(op.operation.partition_key());

        let sealed = match self.open.get(&partition) {
            Some(batch) if !batch.fits(&op, self.max_items, self.max_bytes) => {
                self.open.remove(&partition).map(|full| {
                    tracing::debug!(partition = %full.partition(), "sealing full batch");
                    full.seal()
                })
            }
            _ => None,
        };

        self.open
            .entry(partition.clone())
            .or_insert_with(|| Batch::new(partition))
            .push(op);

        Ok(sealed)
    }

    /// Seals and drains every remaining open batch, in no particular order.
    pub(crate) fn flush(&mut self) -> Vec<SealedBatch<C>> {
        self.open
            .drain()
            .filter(|(_, batch)| !batch.is_empty())
            .map(|(_, batch)| batch.seal())
            .collect()
    }
}
