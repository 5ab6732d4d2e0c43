//! Configuration models for the worker pool, connection pool and queues.

pub mod connection;
pub mod engine;
pub mod pool;

pub use connection::ConnectionPoolConfig;
pub use engine::{EngineConfig, ENV_PREFIX};
pub use pool::{QueueStrategy, WorkerPoolConfig};
