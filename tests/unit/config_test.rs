//! Tests for configuration validation

use std::time::Duration;
use transfer_engine::config::{
    ConnectionPoolConfig, EngineConfig, QueueStrategy, WorkerPoolConfig, ENV_PREFIX,
};

#[test]
fn test_worker_pool_config_validation() {
    let valid = WorkerPoolConfig::new()
        .with_workers(4)
        .with_queue_capacity(100)
        .with_job_timeout(Duration::from_secs(60));
    assert!(valid.validate().is_ok());
}

#[test]
fn test_worker_pool_config_invalid_queue_capacity() {
    let invalid = WorkerPoolConfig::new().with_queue_capacity(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_worker_pool_config_invalid_stack_size() {
    let invalid = WorkerPoolConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_zero_workers_means_cpu_count() {
    let cfg = WorkerPoolConfig::new().with_workers(0);
    assert_eq!(cfg.effective_workers(), num_cpus::get().max(1));
}

#[test]
fn test_connection_pool_config_validation() {
    assert!(ConnectionPoolConfig::new().with_bounds(2, 4).validate().is_ok());
    assert!(ConnectionPoolConfig::new().with_bounds(5, 4).validate().is_err());
    assert!(ConnectionPoolConfig::new()
        .with_check_interval(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_engine_config_json_roundtrip_defaults() {
    let cfg = EngineConfig::from_json_str("{}").expect("empty object uses defaults");
    assert_eq!(cfg, EngineConfig::default());

    let json = serde_json::to_string(&cfg).expect("serialize");
    assert!(json.contains("\"queue_strategy\":\"channel\""));
}

#[test]
fn test_engine_config_json_strategy_names() {
    for (name, strategy) in [
        ("channel", QueueStrategy::Channel),
        ("lock_free", QueueStrategy::LockFree),
        ("work_stealing", QueueStrategy::WorkStealing),
    ] {
        let cfg = EngineConfig::from_json_str(&format!(
            r#"{{ "pool": {{ "queue_strategy": "{name}" }} }}"#
        ))
        .expect("valid strategy");
        assert_eq!(cfg.pool.queue_strategy, strategy);
    }
    assert!(EngineConfig::from_json_str(r#"{ "pool": { "queue_strategy": "fifo" } }"#).is_err());
}

#[test]
fn test_env_prefix() {
    assert_eq!(ENV_PREFIX, "TRANSFER_ENGINE_");
}
