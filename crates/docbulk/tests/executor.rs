//! End-to-end scenarios for the execution pipeline.

mod common;

use common::{MockTransport, StaticRouter, Submission, all_ok};
use docbulk::{
    BatchTransport, BulkExecutor, BulkOperation, ExecutorOptions, FailureKind, ItemOptions,
    ItemOutcome, OperationResult, TransportError,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn executor(transport: &Arc<MockTransport>, options: ExecutorOptions) -> BulkExecutor {
    let transport: Arc<dyn BatchTransport> = Arc::<MockTransport>::clone(transport);
    BulkExecutor::new(transport, Arc::new(StaticRouter), options).unwrap()
}

async fn collect<C>(
    stream: impl futures::Stream<Item = OperationResult<C>>,
) -> Vec<OperationResult<C>> {
    stream.collect().await
}

#[tokio::test]
async fn item_cap_groups_one_partition_into_two_batches() {
    let transport = MockTransport::new(|_, items, _| Ok(all_ok(items)));
    let executor = executor(
        &transport,
        ExecutorOptions {
            max_batch_items: 4,
            ..ExecutorOptions::default()
        },
    );

    let mut ops = Vec::new();
    for i in 0..5 {
        ops.push(BulkOperation::create(json!({"id": format!("c{i}")}), "tenant-1"));
    }
    for i in 0..3 {
        ops.push(BulkOperation::delete(format!("d{i}"), "tenant-1"));
    }

    let results = collect(executor.execute_all(ops)).await;

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(OperationResult::is_success));

    // Strict ordering: indices 0..8 with no gaps or repeats.
    let indices: Vec<u64> = results.iter().map(|r| r.sequence_index).collect();
    assert_eq!(indices, (0..8).collect::<Vec<u64>>());

    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 2);
    assert!(submissions.iter().all(|s| s.len() == 4));
}

#[tokio::test]
async fn results_map_positionally_onto_operations() {
    let transport = MockTransport::new(|_, items, _| Ok(all_ok(items)));
    let executor = executor(&transport, ExecutorOptions::default());

    let ops: Vec<_> = (0..10)
        .map(|i| {
            let id = format!("item-{i}");
            let body = json!({"id": &id});
            BulkOperation::replace(id, body, "tenant-1").with_context(i)
        })
        .collect();

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 10);

    for result in results {
        let etag = result.outcome.unwrap().etag.unwrap();
        assert_eq!(etag, format!("etag-item-{}", result.context));
    }
}

#[tokio::test]
async fn oversized_operation_never_reaches_the_transport() {
    let transport = MockTransport::new(|_, items, _| Ok(all_ok(items)));
    let executor = executor(
        &transport,
        ExecutorOptions {
            max_batch_bytes: 256,
            ..ExecutorOptions::default()
        },
    );

    let op = BulkOperation::create(json!({"id": "a", "blob": "x".repeat(512)}), "tenant-1");
    let results = collect(executor.execute_all(vec![op])).await;

    assert_eq!(results.len(), 1);
    let failure = results[0].outcome.as_ref().unwrap_err();
    assert_eq!(failure.kind, FailureKind::PayloadTooLarge);
    assert_eq!(transport.started(), 0);
}

#[tokio::test]
async fn invalid_operations_fail_without_affecting_siblings() {
    let transport = MockTransport::new(|_, items, _| Ok(all_ok(items)));
    let executor = executor(&transport, ExecutorOptions::default());

    let ops = vec![
        BulkOperation::create(json!({"id": "a"}), "tenant-1").with_context("valid"),
        // Read without an id: rejected before batching.
        BulkOperation::new(docbulk::OperationKind::Read, None, "tenant-1", docbulk::Payload::None)
            .with_context("invalid"),
        BulkOperation::delete("b", "tenant-1").with_context("valid"),
    ];

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 3);

    assert!(results[0].is_success());
    assert!(results[2].is_success());
    let failure = results[1].outcome.as_ref().unwrap_err();
    assert_eq!(failure.kind, FailureKind::Validation);
    assert_eq!(results[1].context, "invalid");

    // Only the two valid operations were submitted.
    let submitted: usize = transport.submissions().iter().map(Submission::len).sum();
    assert_eq!(submitted, 2);
}

#[tokio::test]
async fn store_overflow_rejection_splits_down_to_fitting_batches() {
    // The store accepts at most 3 items per batch, a limit the batcher does
    // not know about.
    let transport = MockTransport::new(|_, items, _| {
        if items.len() > 3 {
            Err(TransportError::BatchTooLarge)
        } else {
            Ok(all_ok(items))
        }
    });
    let executor = executor(&transport, ExecutorOptions::default());

    let ops: Vec<_> = (0..10)
        .map(|i| BulkOperation::delete(format!("item-{i}"), "tenant-1"))
        .collect();

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(OperationResult::is_success));

    // 10 -> 5+5 -> (2+3)+(2+3): seven submissions, four of which succeed,
    // and the split descendants exactly re-cover the original batch.
    let mut sizes: Vec<usize> = transport.submissions().iter().map(Submission::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 2, 3, 3, 5, 5, 10]);

    let mut delivered: Vec<u64> = results.iter().map(|r| r.sequence_index).collect();
    delivered.sort_unstable();
    delivered.dedup();
    assert_eq!(delivered.len(), 10);
}

#[tokio::test]
async fn single_item_batch_rejected_as_too_large_is_terminal_for_that_item() {
    let transport = MockTransport::new(|_, items, _| {
        if items.iter().any(|op| op.id == Some("poison")) {
            Err(TransportError::BatchTooLarge)
        } else {
            Ok(all_ok(items))
        }
    });
    let executor = executor(&transport, ExecutorOptions::default());

    let ops = vec![
        BulkOperation::delete("ok-1", "tenant-1"),
        BulkOperation::delete("poison", "tenant-1"),
        BulkOperation::delete("ok-2", "tenant-1"),
    ];

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert!(results[2].is_success());

    let failure = results[1].outcome.as_ref().unwrap_err();
    assert_eq!(failure.kind, FailureKind::Transport { retryable: false });
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_backoff_until_success() {
    let transport = MockTransport::new(|_, items, attempt| {
        if attempt <= 2 {
            Err(TransportError::Retryable {
                reason: "throttled".into(),
            })
        } else {
            Ok(all_ok(items))
        }
    });
    let executor = executor(
        &transport,
        ExecutorOptions {
            max_retry_attempts: 3,
            backoff_base: Duration::from_millis(100),
            ..ExecutorOptions::default()
        },
    );

    let started = tokio::time::Instant::now();
    let ops: Vec<_> = (0..4)
        .map(|i| BulkOperation::upsert(json!({"id": format!("u{i}")}), "tenant-1"))
        .collect();
    let results = collect(executor.execute_all(ops)).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(OperationResult::is_success));
    assert_eq!(transport.started(), 3);

    // Two backoff waits before the final attempt: at least half of
    // 100ms + 200ms even at minimum jitter.
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_every_operation_in_the_batch() {
    let transport = MockTransport::new(|_, _, _| {
        Err(TransportError::Retryable {
            reason: "throttled".into(),
        })
    });
    let executor = executor(
        &transport,
        ExecutorOptions {
            max_retry_attempts: 2,
            ..ExecutorOptions::default()
        },
    );

    let ops: Vec<_> = (0..3)
        .map(|i| BulkOperation::delete(format!("d{i}"), "tenant-1"))
        .collect();
    let results = collect(executor.execute_all(ops)).await;

    assert_eq!(results.len(), 3);
    for result in &results {
        let failure = result.outcome.as_ref().unwrap_err();
        assert_eq!(failure.kind, FailureKind::RetryExhausted);
    }
    // Initial attempt plus two retries.
    assert_eq!(transport.started(), 3);
}

#[tokio::test]
async fn conditional_rejection_fails_only_the_offending_item() {
    let transport = MockTransport::new(|_, items, _| {
        Ok(docbulk::BatchResponse::new(
            items
                .iter()
                .map(|op| {
                    if op.options.if_match_etag.is_some() {
                        ItemOutcome::rejected(412, "etag mismatch")
                    } else {
                        ItemOutcome::success(200)
                    }
                })
                .collect(),
        ))
    });
    let executor = executor(&transport, ExecutorOptions::default());

    let ops = vec![
        BulkOperation::replace("a", json!({"id": "a"}), "tenant-1"),
        BulkOperation::replace("b", json!({"id": "b"}), "tenant-1")
            .with_options(ItemOptions::new().if_match("stale-etag")),
        BulkOperation::replace("c", json!({"id": "c"}), "tenant-1"),
    ];

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert!(results[2].is_success());

    let failure = results[1].outcome.as_ref().unwrap_err();
    assert_eq!(failure.kind, FailureKind::Conditional);
    assert_eq!(failure.status, Some(412));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_spares_in_flight_batches_and_drops_queued_ones() {
    let transport = MockTransport::gated(|_, items, _| Ok(all_ok(items)));
    let executor = executor(
        &transport,
        ExecutorOptions {
            // One operation per batch, three batches in flight at most.
            max_batch_items: 1,
            max_concurrent_batches: 3,
            ..ExecutorOptions::default()
        },
    );

    let ops: Vec<_> = (0..5)
        .map(|i| BulkOperation::delete(format!("d{i}"), "tenant-1").with_context(i))
        .collect();
    let stream = executor.execute_all(ops);
    let handle = tokio::spawn(collect(stream));

    // Three batches reach the transport and park there; the other two are
    // queued behind the in-flight window.
    transport.wait_for_started(3).await;
    executor.cancel();
    transport.release(5);

    let mut results = handle.await.unwrap();
    results.sort_by_key(|r| r.sequence_index);
    assert_eq!(results.len(), 5);

    // FIFO dispatch: operations 0..3 were in flight and deliver their true
    // outcomes; 3 and 4 never started and resolve as cancelled.
    for result in &results[..3] {
        assert!(result.is_success(), "op {} should succeed", result.context);
    }
    for result in &results[3..] {
        let failure = result.outcome.as_ref().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Cancelled);
    }
    assert_eq!(transport.started(), 3);
}

#[tokio::test]
async fn unordered_mode_still_delivers_every_result_tagged_with_its_index() {
    let transport = MockTransport::new(|_, items, _| Ok(all_ok(items)));
    let executor = executor(
        &transport,
        ExecutorOptions {
            strict_ordering: false,
            max_batch_items: 2,
            ..ExecutorOptions::default()
        },
    );

    let ops: Vec<_> = (0..9)
        .map(|i| {
            let tenant = format!("tenant-{}", i % 3);
            BulkOperation::upsert(json!({"id": format!("u{i}")}), tenant.as_str()).with_context(i as u64)
        })
        .collect();

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 9);

    let mut indices: Vec<u64> = results.iter().map(|r| r.sequence_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..9).collect::<Vec<u64>>());
    assert!(results.iter().all(|r| r.sequence_index == r.context));
}

#[tokio::test]
async fn partitions_dispatch_independently() {
    let transport = MockTransport::new(|partition, items, _| {
        if partition.as_str() == "p:\"flaky\"" {
            Err(TransportError::Terminal {
                reason: "partition offline".into(),
            })
        } else {
            Ok(all_ok(items))
        }
    });
    let executor = executor(&transport, ExecutorOptions::default());

    let ops = vec![
        BulkOperation::delete("a", "steady"),
        BulkOperation::delete("b", "flaky"),
        BulkOperation::delete("c", "steady"),
    ];

    let results = collect(executor.execute_all(ops)).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert!(results[2].is_success());
    assert_eq!(
        results[1].outcome.as_ref().unwrap_err().kind,
        FailureKind::Transport { retryable: false }
    );
}
