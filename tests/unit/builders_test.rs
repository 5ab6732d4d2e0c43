//! Tests for builder modules

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use transfer_engine::builders::{build_engine, WorkerPoolBuilder};
use transfer_engine::config::{EngineConfig, WorkerPoolConfig};
use transfer_engine::core::{
    ConnectionError, ConnectionFactory, NoopMetrics, PoolError, PoolState,
};

struct NullFactory;

#[async_trait]
impl ConnectionFactory for NullFactory {
    type Connection = ();

    async fn create(&self, _ctx: &CancellationToken) -> Result<(), ConnectionError> {
        Ok(())
    }
}

#[test]
fn test_worker_pool_builder_defaults() {
    let pool = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_workers(2))
        .build()
        .expect("valid config");
    let stats = pool.worker_stats();
    assert_eq!(stats.worker_count, 2);
    assert_eq!(stats.strategy, "channel");
    assert_eq!(stats.queue_capacity, Some(1024));
    assert_eq!(pool.state(), PoolState::Created);
}

#[test]
fn test_worker_pool_builder_invalid_config() {
    let result = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_job_timeout(std::time::Duration::ZERO))
        .build();
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_build_engine_from_json() {
    let cfg = EngineConfig::from_json_str(
        r#"{
            "pool": { "workers": 2, "queue_strategy": "lock_free", "queue_capacity": 32 },
            "connections": { "min_connections": 0, "max_connections": 2 }
        }"#,
    )
    .expect("valid config");

    let (pool, connections) =
        build_engine(&cfg, NullFactory, Arc::new(NoopMetrics)).expect("engine");
    let stats = pool.worker_stats();
    assert_eq!(stats.strategy, "lock_free");
    assert_eq!(stats.queue_capacity, Some(32));
    assert_eq!(connections.stats().max_connections, 2);
}

#[test]
fn test_build_engine_rejects_invalid_section() {
    let mut cfg = EngineConfig::default();
    cfg.connections.max_connections = 0;
    let err = build_engine(&cfg, NullFactory, Arc::new(NoopMetrics))
        .err()
        .expect("invalid connections");
    assert!(err.contains("connections invalid"));
}
