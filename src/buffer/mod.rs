//! MLE service - Message buffer pool
//!
//! Every pending outgoing message lives in a [`MessageBuffer`] owned by the
//! [`BufferPool`]. Applications address messages by their random `msg_id`;
//! storage grows in 64-byte steps and the embedded challenge is tracked as an
//! offset so growth never moves it out from under the engine.

mod message;
mod pool;

pub use message::{ChallengeSlot, MessageBuffer, TimeoutParams};
pub use pool::{BufferKey, BufferPool};
