//! Failure taxonomy for the bulk execution engine.
//!
//! Three distinct layers of failure exist and never mix:
//!
//! - [`ConfigError`]: fatal misconfiguration, raised once at construction
//!   time. This is the only error the engine ever surfaces batch-wide.
//! - [`TransportError`]: what the transport collaborator reports for a whole
//!   batch submission. Consumed by the dispatcher, never shown to callers
//!   directly.
//! - [`OperationFailure`]: the terminal, per-item verdict delivered to the
//!   caller inside an [`OperationResult`](crate::OperationResult). Every
//!   submitted operation resolves to exactly one success or one of these.

use core::time::Duration;

pub type Result<T> = core::result::Result<T, ConfigError>;

/// Fatal misconfiguration detected when building an executor.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A cap or buffer size was configured as zero.
    #[error("`{field}` must be greater than zero")]
    ZeroLimit { field: &'static str },

    /// The backoff ceiling is below the backoff base.
    #[error("`backoff_cap` ({cap:?}) must not be below `backoff_base` ({base:?})")]
    BackoffRange { base: Duration, cap: Duration },
}

/// Batch-level failure reported by the transport collaborator.
///
/// The retryability split drives the dispatcher's retry loop;
/// [`TransportError::BatchTooLarge`] is a store-side rejection distinct from
/// transport trouble and triggers a split instead of a retry.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// Transient failure (throttling, connection reset). Safe to resend the
    /// whole batch.
    #[error("retryable transport failure: {reason}")]
    Retryable { reason: String },

    /// Non-transient failure. Terminal for every item in the batch.
    #[error("terminal transport failure: {reason}")]
    Terminal { reason: String },

    /// The store rejected the batch for exceeding a server-side item or
    /// payload limit unknown to the batcher.
    #[error("batch rejected by the store as too large")]
    BatchTooLarge,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Classifies a terminal per-item failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The operation was malformed (`kind`/`id`/`payload` mismatch). Never
    /// reached the batcher.
    Validation,
    /// A single item's serialized size exceeds the configured byte cap. Never
    /// sent to the transport.
    PayloadTooLarge,
    /// The transport failed terminally, or the store rejected a single-item
    /// batch as too large.
    Transport { retryable: bool },
    /// The store rejected this item inside an otherwise successful batch
    /// response (e.g. a stale version predicate).
    Conditional,
    /// Every retry attempt was spent on transient failures.
    RetryExhausted,
    /// The operation was cancelled before its batch was dispatched.
    Cancelled,
}

/// Terminal failure verdict for one operation.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct OperationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Store status code, when the failure originated server-side.
    pub status: Option<u16>,
}

impl OperationFailure {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn with_status(kind: FailureKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status: Some(status),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "operation cancelled before dispatch")
    }
}
