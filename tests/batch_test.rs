//! Integration tests for BatchProcessor

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use transfer_engine::config::{QueueStrategy, WorkerPoolConfig};
use transfer_engine::core::{job_fn, BatchProcessor, JobError, PoolError, WorkerPool};

fn started_pool(workers: usize, strategy: QueueStrategy) -> Arc<WorkerPool> {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new()
            .with_workers(workers)
            .with_queue_capacity(8)
            .with_queue_strategy(strategy)
            .with_max_retries(0),
    )
    .expect("Failed to create pool");
    pool.start().expect("Failed to start");
    Arc::new(pool)
}

/// Scenario E: 5 jobs, job #3 fails; 5 results, exactly one error
#[test]
fn test_batch_with_one_failure() {
    println!("\n=== test_batch_with_one_failure ===");

    let pool = started_pool(3, QueueStrategy::Channel);
    let processor = BatchProcessor::new(Arc::clone(&pool));

    let jobs = (1..=5)
        .map(|n| {
            job_fn(format!("upload-{n}"), move |_ctx| async move {
                if n == 3 {
                    Err(JobError::fatal("checksum mismatch"))
                } else {
                    Ok(())
                }
            })
        })
        .collect();

    let results = processor.process_batch(jobs);
    pool.stop();

    println!("Results: {results:?}");
    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 4);
    let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job().name(), "upload-3");
    assert_eq!(processor.progress(), (5, 5));

    println!("=== test_batch_with_one_failure PASSED ===\n");
}

/// P6: progress callbacks are non-decreasing and end at (total, total)
#[test]
fn test_progress_is_monotonic() {
    for strategy in [QueueStrategy::Channel, QueueStrategy::WorkStealing] {
        let pool = started_pool(4, strategy);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let processor = BatchProcessor::new(Arc::clone(&pool))
            .with_progress(move |completed, total| sink.lock().push((completed, total)));

        let jobs = (0..40)
            .map(|i| {
                job_fn(format!("list-{i}"), move |_ctx| async move {
                    tokio::time::sleep(Duration::from_millis(i % 3)).await;
                    Ok(())
                })
            })
            .collect();
        let results = processor.process_batch(jobs);
        pool.stop();

        let calls = calls.lock();
        assert_eq!(results.len(), 40);
        assert_eq!(calls.len(), 40);
        assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(calls.iter().all(|&(completed, total)| completed <= total && total == 40));
        assert_eq!(calls.last(), Some(&(40, 40)));
    }
}

/// Progress resets at the start of every batch
#[test]
fn test_progress_resets_between_batches() {
    let pool = started_pool(2, QueueStrategy::LockFree);
    let processor = BatchProcessor::new(Arc::clone(&pool));

    let first = (0..3).map(|_| job_fn("a", |_ctx| async { Ok(()) })).collect();
    assert_eq!(processor.process_batch(first).len(), 3);
    assert_eq!(processor.progress(), (3, 3));

    let second = (0..2).map(|_| job_fn("b", |_ctx| async { Ok(()) })).collect();
    assert_eq!(processor.process_batch(second).len(), 2);
    assert_eq!(processor.progress(), (2, 2));

    pool.stop();
}

/// A stopped pool rejects the batch with a single error result
#[test]
fn test_submission_failure_is_a_hard_stop() {
    let pool = started_pool(1, QueueStrategy::Channel);
    pool.stop();

    let processor = BatchProcessor::new(Arc::clone(&pool));
    let jobs = (0..5).map(|_| job_fn("delete", |_ctx| async { Ok(()) })).collect();
    let results = processor.process_batch(jobs);

    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0].error(),
        Some(JobError::Rejected(PoolError::PoolClosed))
    ));
}
