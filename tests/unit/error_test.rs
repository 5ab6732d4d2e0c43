//! Tests for error types

use std::time::Duration;
use transfer_engine::core::{ConnectionError, JobError, PoolError};

#[test]
fn test_pool_error_display() {
    assert_eq!(format!("{}", PoolError::PoolClosed), "worker pool is closed");
    assert_eq!(format!("{}", PoolError::QueueFull), "job queue is full");
    assert_eq!(
        format!("{}", PoolError::InvalidConfig("queue_capacity".to_string())),
        "invalid configuration: queue_capacity"
    );
}

#[test]
fn test_job_error_display() {
    assert_eq!(format!("{}", JobError::fatal("403 forbidden")), "403 forbidden");
    assert_eq!(
        format!("{}", JobError::Timeout(Duration::from_millis(250))),
        "job timed out after 250ms"
    );
    assert_eq!(
        format!("{}", JobError::from(PoolError::PoolClosed)),
        "job rejected: worker pool is closed"
    );
}

#[test]
fn test_retry_classification() {
    assert!(JobError::recoverable("503 slow down").is_recoverable());
    assert!(JobError::Timeout(Duration::from_secs(1)).is_recoverable());
    assert!(!JobError::fatal("404").is_recoverable());
    assert!(!JobError::Cancelled.is_recoverable());
    assert!(!JobError::Panicked("boom".to_string()).is_recoverable());
    assert!(!JobError::Rejected(PoolError::QueueFull).is_recoverable());
}

#[test]
fn test_connection_error_display() {
    let err = ConnectionError::Create("connection refused".to_string());
    assert_eq!(format!("{}", err), "failed to create connection: connection refused");
    assert_eq!(format!("{}", ConnectionError::Cancelled), "connection acquire cancelled");
}
