//! Scripted transport and router doubles shared by the integration tests.

use async_trait::async_trait;
use docbulk::{
    BatchResponse, BatchTransport, ItemOutcome, PartitionId, PartitionKey, PartitionRouter,
    TransportError, WireOperation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// What the mock saw for one `submit` call.
#[derive(Clone, Debug)]
pub struct Submission {
    pub partition: String,
    pub ids: Vec<Option<String>>,
}

impl Submission {
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Scripted behavior: `(partition, items, per-partition attempt ordinal)`
/// to the transport's reply.
pub type Behavior = dyn for<'a> Fn(&PartitionId, &[WireOperation<'a>], usize) -> Result<BatchResponse, TransportError>
    + Send
    + Sync;

/// In-memory transport double. Records every submission and answers from a
/// scripted closure; the gated variant additionally parks each call until
/// the test releases it, to pin down how many batches are in flight.
pub struct MockTransport {
    behavior: Box<Behavior>,
    submissions: Mutex<Vec<Submission>>,
    attempts: Mutex<HashMap<String, usize>>,
    started: AtomicUsize,
    gate: Option<Semaphore>,
}

impl MockTransport {
    pub fn new(
        behavior: impl for<'a> Fn(&PartitionId, &[WireOperation<'a>], usize) -> Result<BatchResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(behavior),
            submissions: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            started: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn gated(
        behavior: impl for<'a> Fn(&PartitionId, &[WireOperation<'a>], usize) -> Result<BatchResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(behavior),
            submissions: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            started: AtomicUsize::new(0),
            gate: Some(Semaphore::new(0)),
        })
    }

    /// Lets `n` parked submissions proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait_for_started(&self, n: usize) {
        for _ in 0..2_000 {
            if self.started() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("transport never reached {n} started submissions");
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchTransport for MockTransport {
    async fn submit(
        &self,
        partition: &PartitionId,
        items: &[WireOperation<'_>],
    ) -> Result<BatchResponse, TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let slot = attempts.entry(partition.as_str().to_owned()).or_insert(0);
            *slot += 1;
            *slot
        };

        self.submissions.lock().unwrap().push(Submission {
            partition: partition.as_str().to_owned(),
            ids: items.iter().map(|op| op.id.map(str::to_owned)).collect(),
        });
        self.started.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| TransportError::Terminal {
                reason: "gate closed".into(),
            })?;
            permit.forget();
        }

        (self.behavior)(partition, items, attempt)
    }
}

/// Every item succeeds; etags are derived from the item id so tests can
/// verify positional result-to-operation mapping.
pub fn all_ok(items: &[WireOperation<'_>]) -> BatchResponse {
    BatchResponse::new(
        items
            .iter()
            .map(|op| {
                ItemOutcome::success(200).with_etag(format!("etag-{}", op.id.unwrap_or("new")))
            })
            .collect(),
    )
}

/// Routes every key to the partition named after the key's string form.
pub struct StaticRouter;

impl PartitionRouter for StaticRouter {
    fn resolve(&self, key: &PartitionKey) -> PartitionId {
        PartitionId::from(format!("p:{}", key.value()))
    }
}
