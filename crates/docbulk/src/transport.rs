//! Boundary contracts consumed by the engine.
//!
//! The engine is a pass-through orchestration layer: it owns no wire format
//! and no routing metadata. The transport collaborator submits a sealed batch
//! to a named partition and reports per-item outcomes (or a batch-level
//! [`TransportError`]); the partition router resolves a partition key to the
//! physical partition currently responsible for it.

use crate::error::TransportError;
use crate::operation::{ItemOptions, OperationKind, PartitionId, PartitionKey, Payload};
use crate::outcome::ItemResponse;
use async_trait::async_trait;
use bytes::Bytes;

/// Borrowed, context-free view of one operation as handed to the transport.
///
/// The transport serializes these with its own codec; caller context never
/// crosses this boundary.
#[derive(Clone, Copy, Debug)]
pub struct WireOperation<'a> {
    pub kind: OperationKind,
    pub id: Option<&'a str>,
    pub partition_key: &'a PartitionKey,
    pub payload: &'a Payload,
    pub options: &'a ItemOptions,
}

/// Store verdict for one submitted item.
///
/// `error` is set for per-item rejections (e.g. a failed conditional-match
/// predicate) inside an otherwise successful batch response.
#[derive(Clone, Debug)]
pub struct ItemOutcome {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Option<Bytes>,
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn success(status: u16) -> Self {
        Self {
            status,
            etag: None,
            body: None,
            error: None,
        }
    }

    pub fn rejected(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            etag: None,
            body: None,
            error: Some(error.into()),
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    pub(crate) fn into_response(self) -> ItemResponse {
        ItemResponse {
            status: self.status,
            etag: self.etag,
            body: self.body,
        }
    }
}

/// Per-item outcomes for one batch submission, positionally matching the
/// submitted item order.
#[derive(Clone, Debug)]
pub struct BatchResponse {
    pub items: Vec<ItemOutcome>,
}

impl BatchResponse {
    pub fn new(items: Vec<ItemOutcome>) -> Self {
        Self { items }
    }
}

/// Submits sealed batches to the store.
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Submits `items` as one batch against `partition`.
    ///
    /// On success the response carries exactly one [`ItemOutcome`] per
    /// submitted item, in submission order.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Retryable`] for transient failures; the engine
    ///   resends the whole batch after a backoff delay.
    /// - [`TransportError::BatchTooLarge`] when the store rejects the batch
    ///   for exceeding a server-side limit; the engine splits and resubmits.
    /// - [`TransportError::Terminal`] for everything else.
    async fn submit(
        &self,
        partition: &PartitionId,
        items: &[WireOperation<'_>],
    ) -> Result<BatchResponse, TransportError>;
}

/// Resolves a partition key to the physical partition currently responsible
/// for it.
///
/// The mapping may change between calls (dynamic repartitioning); the engine
/// never caches a resolution beyond the lifetime of one open batch. Unknown
/// keys resolve to a fresh partition rather than failing.
pub trait PartitionRouter: Send + Sync + 'static {
    fn resolve(&self, key: &PartitionKey) -> PartitionId;
}
