//! Queue backends.

pub mod channel;
pub mod lock_free;
pub mod ring_buffer;
pub mod work_stealing;

pub use channel::ChannelQueue;
pub use lock_free::LockFreeQueue;
pub use ring_buffer::RingBuffer;
pub use work_stealing::WorkStealingScheduler;
