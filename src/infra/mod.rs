//! Infrastructure adapters: the interchangeable job queue backends.

pub mod queue;
pub use queue::ChannelQueue;
pub use queue::LockFreeQueue;
pub use queue::RingBuffer;
pub use queue::WorkStealingScheduler;
