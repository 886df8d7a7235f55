//! Reassembles completion-order results into the caller-facing stream.
//!
//! In unordered mode results pass straight through, tagged with their
//! sequence index. In strict mode a reorder buffer keyed by sequence index
//! holds early arrivals until the next expected index completes; delivered
//! indices are strictly increasing with no gaps or repeats. The buffer grows
//! past the configured channel bound only while a low-index operation is
//! stalled, and never beyond the in-flight window feeding it.

use crate::outcome::OperationResult;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub(crate) async fn reassemble<C>(
    mut completed: mpsc::Receiver<OperationResult<C>>,
    ordered: mpsc::Sender<OperationResult<C>>,
    strict: bool,
) {
    if !strict {
        while let Some(result) = completed.recv().await {
            if ordered.send(result).await.is_err() {
                return;
            }
        }
        return;
    }

    let mut next_index: u64 = 0;
    let mut pending: HashMap<u64, OperationResult<C>> = HashMap::new();

    while let Some(result) = completed.recv().await {
        pending.insert(result.sequence_index, result);

        while let Some(ready) = pending.remove(&next_index) {
            if ordered.send(ready).await.is_err() {
                return;
            }
            next_index += 1;
        }
    }

    // Input closed. With one result per submitted operation the buffer is
    // already empty; a residue means an upstream bug, so surface it rather
    // than dropping results on the floor.
    if !pending.is_empty() {
        tracing::warn!(
            buffered = pending.len(),
            next_index,
            "result stream closed with a sequence gap"
        );
        let mut rest: Vec<OperationResult<C>> = pending.into_values().collect();
        rest.sort_by_key(|result| result.sequence_index);
        for result in rest {
            if ordered.send(result).await.is_err() {
                return;
            }
        }
    }
}
