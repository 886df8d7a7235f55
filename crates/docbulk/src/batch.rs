//! Batches: groups of operations destined for one physical partition.
//!
//! A [`Batch`] grows while its partition's slot is open in the batcher; both
//! caps hold at all times. [`Batch::seal`] freezes it into a [`SealedBatch`],
//! which is what the dispatcher owns until every contained operation has a
//! terminal result.

use crate::operation::{PartitionId, SequencedOperation};
use crate::transport::WireOperation;

/// An open batch accumulating operations for one partition.
#[derive(Debug)]
pub(crate) struct Batch<C> {
    partition: PartitionId,
    items: Vec<SequencedOperation<C>>,
    byte_size: usize,
}

impl<C> Batch<C> {
    pub(crate) fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            items: Vec::new(),
            byte_size: 0,
        }
    }

    /// Whether `op` can be appended without exceeding either cap.
    ///
    /// An empty batch accepts any single operation that fits the byte cap on
    /// its own; oversized singletons are rejected upstream, before batching.
    pub(crate) fn fits(&self, op: &SequencedOperation<C>, max_items: usize, max_bytes: usize) -> bool {
        self.items.len() < max_items && self.byte_size + op.encoded_len <= max_bytes
    }

    pub(crate) fn push(&mut self, op: SequencedOperation<C>) {
        self.byte_size += op.encoded_len;
        self.items.push(op);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn partition(&self) -> &PartitionId {
        &self.partition
    }

    pub(crate) fn seal(self) -> SealedBatch<C> {
        SealedBatch {
            partition: self.partition,
            items: self.items,
            byte_size: self.byte_size,
        }
    }
}

/// An immutable batch handed to the dispatcher.
#[derive(Debug)]
pub(crate) struct SealedBatch<C> {
    partition: PartitionId,
    items: Vec<SequencedOperation<C>>,
    byte_size: usize,
}

impl<C> SealedBatch<C> {
    pub(crate) fn partition(&self) -> &PartitionId {
        &self.partition
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub(crate) fn items(&self) -> &[SequencedOperation<C>] {
        &self.items
    }

    pub(crate) fn into_items(self) -> Vec<SequencedOperation<C>> {
        self.items
    }

    /// The transport-facing view of the batch, in item order.
    pub(crate) fn wire_items(&self) -> Vec<WireOperation<'_>> {
        self.items
            .iter()
            .map(|op| WireOperation {
                kind: op.operation.kind(),
                id: op.operation.id(),
                partition_key: op.operation.partition_key(),
                payload: op.operation.payload(),
                options: op.operation.options(),
            })
            .collect()
    }

    /// Splits in half by item count, preserving item order across the pair.
    /// Callers must not split a single-item batch.
    pub(crate) fn split(self) -> (SealedBatch<C>, SealedBatch<C>) {
        debug_assert!(self.items.len() > 1);

        let mut left_items = self.items;
        let right_items = left_items.split_off(left_items.len() / 2);

        let left_bytes = left_items.iter().map(|op| op.encoded_len).sum();
        let right_bytes = right_items.iter().map(|op| op.encoded_len).sum();

        (
            SealedBatch {
                partition: self.partition.clone(),
                items: left_items,
                byte_size: left_bytes,
            },
            SealedBatch {
                partition: self.partition,
                items: right_items,
                byte_size: right_bytes,
            },
        )
    }
}
