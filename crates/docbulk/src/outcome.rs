//! Per-operation outcomes delivered back to the caller.

use crate::error::OperationFailure;
use bytes::Bytes;

/// Successful store response for one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemResponse {
    /// Store status code for this item.
    pub status: u16,
    /// Item version tag after the operation, when the store returned one.
    pub etag: Option<String>,
    /// Response body, absent for deletes and when the content-response
    /// toggle asked the store to omit it.
    pub body: Option<Bytes>,
}

/// Terminal outcome of one submitted operation.
///
/// The engine yields exactly one of these per submitted operation, success or
/// failure, never a silent drop.
#[derive(Debug)]
pub struct OperationResult<C = ()> {
    /// Mirrors the originating operation's submission-order index.
    pub sequence_index: u64,
    pub outcome: Result<ItemResponse, OperationFailure>,
    /// The caller context from the originating operation, unmodified.
    pub context: C,
}

impl<C> OperationResult<C> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
