//! Transport protocol implementation: stateless frame codec, per-channel
//! transmit/receive state machines, identifier routing, the tick scheduler,
//! and an embassy-based runner for async firmwares.
pub mod codec;
pub mod dispatch;
pub mod frame;
pub mod runner;
pub mod rx;
pub mod scheduler;
pub mod traits;
pub mod tx;

#[cfg(test)]
pub mod mock;
