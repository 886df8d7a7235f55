#![doc = include_str!("../README.md")]

mod batch;
mod config;
mod error;
mod executor;
mod operation;
mod outcome;
mod transport;

pub use crate::config::ExecutorOptions;
pub use crate::error::{ConfigError, FailureKind, OperationFailure, Result, TransportError};
pub use crate::executor::BulkExecutor;
pub use crate::operation::{
    BulkOperation, ItemOptions, OperationKind, PartitionId, PartitionKey, PatchStep, Payload,
};
pub use crate::outcome::{ItemResponse, OperationResult};
pub use crate::transport::{
    BatchResponse, BatchTransport, ItemOutcome, PartitionRouter, WireOperation,
};
