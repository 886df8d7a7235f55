//! The operation model: immutable descriptions of one unit of work each.
//!
//! A [`BulkOperation`] is built through the per-kind constructors
//! ([`BulkOperation::create`], [`BulkOperation::read`], ...) or through the
//! raw [`BulkOperation::new`] when the shape comes from an untrusted source.
//! Either way, `kind`/`id`/`payload` consistency is enforced during
//! submission, before an operation can reach the batcher.

mod options;
mod patch;

pub use options::ItemOptions;
pub use patch::PatchStep;

use crate::error::OperationFailure;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of work a single operation performs against the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Create,
    Read,
    Replace,
    Upsert,
    Delete,
    Patch,
}

impl OperationKind {
    /// Kinds that address an existing item and therefore require an id.
    /// Create and Upsert carry the id inside the item body instead.
    pub fn requires_id(self) -> bool {
        matches!(self, Self::Read | Self::Replace | Self::Delete | Self::Patch)
    }
}

/// Caller-supplied key determining which physical partition owns an item.
///
/// The key is an opaque scalar from the engine's point of view; only the
/// [`PartitionRouter`](crate::PartitionRouter) interprets it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(Value);

impl PartitionKey {
    pub fn value(&self) -> &Value {
        &self.0
    }

    fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self(Value::from(key))
    }
}

impl From<String> for PartitionKey {
    fn from(key: String) -> Self {
        Self(Value::from(key))
    }
}

impl From<i64> for PartitionKey {
    fn from(key: i64) -> Self {
        Self(Value::from(key))
    }
}

impl From<bool> for PartitionKey {
    fn from(key: bool) -> Self {
        Self(Value::from(key))
    }
}

/// Identifier of the physical partition currently responsible for a key,
/// as reported by the partition router. Treated as opaque.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartitionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PartitionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of an operation: an item document, a patch document, or nothing.
///
/// Untagged: patch steps and null are tried before the catch-all item
/// document when deserializing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Steps(Vec<PatchStep>),
    None,
    Item(Value),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// An immutable description of one unit of work.
///
/// `C` is a caller-opaque context carried through the pipeline unmodified and
/// returned alongside the result.
#[derive(Clone, Debug)]
pub struct BulkOperation<C = ()> {
    kind: OperationKind,
    id: Option<String>,
    partition_key: PartitionKey,
    payload: Payload,
    options: ItemOptions,
    context: C,
}

impl BulkOperation<()> {
    /// Builds an operation from raw parts. Shape consistency is checked at
    /// submission time; prefer the per-kind constructors when the shape is
    /// known statically.
    pub fn new(
        kind: OperationKind,
        id: Option<String>,
        partition_key: impl Into<PartitionKey>,
        payload: Payload,
    ) -> Self {
        Self {
            kind,
            id,
            partition_key: partition_key.into(),
            payload,
            options: ItemOptions::default(),
            context: (),
        }
    }

    /// An operation creating `item` in the store. The item body must carry
    /// its own id property.
    pub fn create(item: Value, partition_key: impl Into<PartitionKey>) -> Self {
        Self::new(OperationKind::Create, None, partition_key, Payload::Item(item))
    }

    /// An operation reading the item identified by `id`.
    pub fn read(id: impl Into<String>, partition_key: impl Into<PartitionKey>) -> Self {
        Self::new(OperationKind::Read, Some(id.into()), partition_key, Payload::None)
    }

    /// An operation replacing the item identified by `id` with `item`.
    pub fn replace(
        id: impl Into<String>,
        item: Value,
        partition_key: impl Into<PartitionKey>,
    ) -> Self {
        Self::new(
            OperationKind::Replace,
            Some(id.into()),
            partition_key,
            Payload::Item(item),
        )
    }

    /// An operation creating or replacing `item`, whichever applies.
    pub fn upsert(item: Value, partition_key: impl Into<PartitionKey>) -> Self {
        Self::new(OperationKind::Upsert, None, partition_key, Payload::Item(item))
    }

    /// An operation deleting the item identified by `id`.
    pub fn delete(id: impl Into<String>, partition_key: impl Into<PartitionKey>) -> Self {
        Self::new(OperationKind::Delete, Some(id.into()), partition_key, Payload::None)
    }

    /// An operation applying `steps` in order to the item identified by `id`.
    pub fn patch(
        id: impl Into<String>,
        steps: Vec<PatchStep>,
        partition_key: impl Into<PartitionKey>,
    ) -> Self {
        Self::new(
            OperationKind::Patch,
            Some(id.into()),
            partition_key,
            Payload::Steps(steps),
        )
    }
}

impl<C> BulkOperation<C> {
    /// Replaces the per-item request options.
    pub fn with_options(mut self, options: ItemOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches a caller context, returned unmodified with the result.
    pub fn with_context<D>(self, context: D) -> BulkOperation<D> {
        BulkOperation {
            kind: self.kind,
            id: self.id,
            partition_key: self.partition_key,
            payload: self.payload,
            options: self.options,
            context,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn options(&self) -> &ItemOptions {
        &self.options
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Consumes the operation, yielding the caller context back.
    pub fn into_context(self) -> C {
        self.context
    }

    /// Checks `kind`/`id`/`payload` consistency and partition-key presence.
    ///
    /// Violations never reach the batcher; they resolve immediately as
    /// validation failures.
    fn validate(&self) -> core::result::Result<(), OperationFailure> {
        if self.partition_key.is_null() {
            return Err(OperationFailure::validation("partition key must not be null"));
        }

        match (self.kind.requires_id(), &self.id) {
            (true, None) => {
                return Err(OperationFailure::validation(format!(
                    "{:?} operations require an item id",
                    self.kind
                )));
            }
            (true, Some(id)) if id.is_empty() => {
                return Err(OperationFailure::validation("item id must not be empty"));
            }
            (false, Some(_)) => {
                return Err(OperationFailure::validation(format!(
                    "{:?} operations carry the id inside the item body",
                    self.kind
                )));
            }
            _ => {}
        }

        match (self.kind, &self.payload) {
            (OperationKind::Create | OperationKind::Replace | OperationKind::Upsert, Payload::Item(item)) => {
                if !item.is_object() {
                    return Err(OperationFailure::validation("item body must be a JSON object"));
                }
            }
            (OperationKind::Create | OperationKind::Replace | OperationKind::Upsert, _) => {
                return Err(OperationFailure::validation(format!(
                    "{:?} operations require an item body",
                    self.kind
                )));
            }
            (OperationKind::Patch, Payload::Steps(steps)) => {
                if steps.is_empty() {
                    return Err(OperationFailure::validation(
                        "patch operations require at least one step",
                    ));
                }
            }
            (OperationKind::Patch, _) => {
                return Err(OperationFailure::validation(
                    "patch operations require a list of patch steps",
                ));
            }
            (OperationKind::Read | OperationKind::Delete, Payload::None) => {}
            (OperationKind::Read | OperationKind::Delete, _) => {
                return Err(OperationFailure::validation(format!(
                    "{:?} operations must not carry a payload",
                    self.kind
                )));
            }
        }

        Ok(())
    }
}

/// Wire envelope used to measure an operation's serialized size.
///
/// The transport owns the actual codec; this mirrors its per-item shape so
/// the byte cap tracks what actually goes on the wire.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SizingEnvelope<'a> {
    operation_type: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    partition_key: &'a PartitionKey,
    #[serde(skip_serializing_if = "payload_absent")]
    resource_body: &'a Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    if_match: Option<&'a str>,
}

fn payload_absent(payload: &&Payload) -> bool {
    payload.is_none()
}

/// An operation accepted for execution: validated, sized, and stamped with
/// its submission-order sequence index.
#[derive(Clone, Debug)]
pub(crate) struct SequencedOperation<C> {
    pub(crate) index: u64,
    pub(crate) operation: BulkOperation<C>,
    pub(crate) encoded_len: usize,
}

impl<C> SequencedOperation<C> {
    /// Validates `operation` and computes its serialized size.
    pub(crate) fn accept(
        index: u64,
        operation: BulkOperation<C>,
    ) -> core::result::Result<Self, (BulkOperation<C>, OperationFailure)> {
        if let Err(failure) = operation.validate() {
            return Err((operation, failure));
        }

        let envelope = SizingEnvelope {
            operation_type: operation.kind,
            id: operation.id(),
            partition_key: &operation.partition_key,
            resource_body: &operation.payload,
            if_match: operation.options.if_match_etag.as_deref(),
        };

        match serde_json::to_vec(&envelope) {
            Ok(encoded) => Ok(Self {
                index,
                operation,
                encoded_len: encoded.len(),
            }),
            Err(e) => {
                let failure = OperationFailure::validation(format!("unserializable payload: {e}"));
                Err((operation, failure))
            }
        }
    }

    /// Consumes the operation, yielding the caller context back.
    pub(crate) fn into_context(self) -> C {
        self.operation.into_context()
    }
}
