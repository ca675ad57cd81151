//! MLE service - Interface registry
//!
//! One [`ServiceInstance`] per registered network interface, holding the
//! MAC, receive handlers, retransmission defaults and the transmit
//! [`TokenBucket`].

mod instance;
mod registry;
mod token_bucket;

pub use instance::{ServiceInstance, TimerDefaults};
pub use registry::InterfaceRegistry;
pub use token_bucket::TokenBucket;
