//! Tests for the job abstraction

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use transfer_engine::core::{job_fn, Backoff, FnJob, Job, JobContext, JobError, JobId};

fn ctx(token: CancellationToken) -> JobContext {
    JobContext::new(JobId::new_v4(), 1, 0, Duration::from_secs(1), token)
}

#[test]
fn test_backoff_curves() {
    let base = Duration::from_millis(100);
    let max = Duration::from_secs(1);
    assert_eq!(Backoff::Linear.delay(base, 3, max), Duration::from_millis(300));
    assert_eq!(Backoff::Exponential.delay(base, 3, max), Duration::from_millis(400));
    assert_eq!(Backoff::Exponential.delay(base, 10, max), max);
}

#[tokio::test]
async fn test_fn_job_executes_closure() {
    let job = job_fn("list-prefix", |ctx: JobContext| async move {
        if ctx.attempt() == 1 {
            Err(JobError::recoverable("throttled"))
        } else {
            Ok(())
        }
    });
    assert_eq!(job.name(), "list-prefix");
    let err = job
        .execute(&ctx(CancellationToken::new()))
        .await
        .expect_err("first attempt fails");
    assert!(job.is_recoverable(&err));
}

#[tokio::test]
async fn test_context_observes_cancellation() {
    let token = CancellationToken::new();
    let context = ctx(token.child_token());
    assert!(!context.is_cancelled());
    assert!(context.remaining().is_some_and(|left| left <= Duration::from_secs(1)));

    token.cancel();
    context.cancelled().await;
    assert!(context.is_cancelled());
}

#[test]
fn test_fn_job_backoff_override() {
    let job = FnJob::new("download", |_ctx: JobContext| async { Ok::<(), JobError>(()) })
        .with_backoff(Backoff::Linear);
    assert_eq!(job.backoff(), Backoff::Linear);
}
