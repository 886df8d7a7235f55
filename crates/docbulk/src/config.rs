//! Executor configuration.
//!
//! [`ExecutorOptions`] is the raw, caller-facing surface; it converts into a
//! validated [`ExecutorConfig`] via `TryFrom`, failing fast at construction
//! time. That conversion is the only place a batch-wide error can originate.

use crate::error::{ConfigError, Result};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Raw configuration surface for a [`BulkExecutor`](crate::BulkExecutor).
///
/// Defaults mirror commonly documented store limits, but the store's actual
/// server-side thresholds may be lower; the dispatcher discovers those at
/// runtime through `BatchTooLarge` rejections and splits accordingly, so
/// nothing here needs to match the server exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Maximum operations per batch.
    pub max_batch_items: usize,
    /// Maximum serialized payload bytes per batch. A single operation larger
    /// than this resolves as `PayloadTooLarge` without a transport call.
    pub max_batch_bytes: usize,
    /// Maximum batches in flight simultaneously.
    pub max_concurrent_batches: usize,
    /// Retries after the initial attempt for retryable transport failures.
    pub max_retry_attempts: u32,
    /// Backoff before the first retry; doubles per subsequent retry.
    pub backoff_base: Duration,
    /// Ceiling on the backoff delay (applied before jitter).
    pub backoff_cap: Duration,
    /// When `true`, results are delivered in submission order; otherwise in
    /// completion order, tagged with their sequence index either way.
    pub strict_ordering: bool,
    /// Capacity of the result channel between dispatch workers and the
    /// caller-facing stream. A stalled consumer backpressures dispatch
    /// through this bound. Under strict ordering the reorder buffer can
    /// exceed it only while one low-index operation is stalled, and even
    /// then by no more than the in-flight window
    /// (`max_concurrent_batches * max_batch_items`).
    pub result_buffer_size: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_batch_items: 100,
            max_batch_bytes: 1024 * 1024,
            max_concurrent_batches: 16,
            max_retry_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(5),
            strict_ordering: true,
            result_buffer_size: 256,
        }
    }
}

/// Validated executor configuration.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub(crate) max_batch_items: usize,
    pub(crate) max_batch_bytes: usize,
    pub(crate) max_concurrent_batches: usize,
    pub(crate) max_retry_attempts: u32,
    pub(crate) backoff_base: Duration,
    pub(crate) backoff_cap: Duration,
    pub(crate) strict_ordering: bool,
    pub(crate) result_buffer_size: usize,
}

impl TryFrom<ExecutorOptions> for ExecutorConfig {
    type Error = ConfigError;

    fn try_from(options: ExecutorOptions) -> Result<Self> {
        for (field, value) in [
            ("max_batch_items", options.max_batch_items),
            ("max_batch_bytes", options.max_batch_bytes),
            ("max_concurrent_batches", options.max_concurrent_batches),
            ("result_buffer_size", options.result_buffer_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { field });
            }
        }

        if options.backoff_cap < options.backoff_base {
            return Err(ConfigError::BackoffRange {
                base: options.backoff_base,
                cap: options.backoff_cap,
            });
        }

        Ok(Self {
            max_batch_items: options.max_batch_items,
            max_batch_bytes: options.max_batch_bytes,
            max_concurrent_batches: options.max_concurrent_batches,
            max_retry_attempts: options.max_retry_attempts,
            backoff_base: options.backoff_base,
            backoff_cap: options.backoff_cap,
            strict_ordering: options.strict_ordering,
            result_buffer_size: options.result_buffer_size,
        })
    }
}
