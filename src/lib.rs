//! # MLE Service
//!
//! **M**esh **L**ink **E**stablishment service core for 6LoWPAN/Thread nodes.
//!
//! The service sits between the MLE protocol logic and a UDP/IPv6 socket.
//! It provides:
//!
//! - **Buffers**: message allocation with generation-checked handles
//! - **Reliability**: retransmission with jittered exponential backoff
//! - **Rate limiting**: per-interface transmit token buckets
//! - **Security**: IEEE 802.15.4 CCM* envelope with AES-128
//! - **Anti-replay**: per-neighbor frame counter and key sequence checks
//!
//! ## Feature Flags
//!
//! - `transport` (default): tokio UDP transport and tick driver
//!
//! ## Modules
//!
//! - [`core`]: constants, error types, datagrams and collaborator traits
//! - [`crypto`]: security header, CCM*, key store and anti-replay
//! - [`buffer`]: message buffers and the buffer pool
//! - [`interface`]: per-interface state and token buckets
//! - [`service`]: the service context, send/receive pipelines and engine
//! - [`transport`]: tokio collaborators (requires `transport` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::io;
//! use std::time::Duration;
//!
//! use mle_service::prelude::*;
//!
//! struct Discard;
//!
//! impl Transport for Discard {
//!     fn open(&mut self, _port: u16) -> io::Result<()> {
//!         Ok(())
//!     }
//!     fn send(&mut self, _datagram: &Datagram) -> io::Result<()> {
//!         Ok(())
//!     }
//!     fn close(&mut self) {}
//! }
//!
//! struct NoTimer;
//!
//! impl Scheduler for NoTimer {
//!     fn request_periodic(&mut self, _period: Duration) -> TimerHandle {
//!         TimerHandle(0)
//!     }
//!     fn cancel(&mut self, _handle: TimerHandle) {}
//! }
//!
//! let mut keys = StaticKeyStore::new();
//! keys.add_interface(1, 5);
//! keys.insert_key(1, 0, MleKey::from_bytes([0x11; 16]));
//!
//! let mut service = MleService::builder(keys)
//!     .transport(Discard)
//!     .scheduler(NoTimer)
//!     .build()?;
//!
//! let mac = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
//! service.interface_register(1, |msg: &MleMessage, _: Option<&SecurityHeader>| {
//!     println!("MLE command {} from {}", msg.msg_type, msg.source);
//! }, mac, 8)?;
//!
//! let msg_id = service.msg_allocate(1, 32, true, 0x00)?;
//! service.msg_set_destination(msg_id, "ff02::1".parse().unwrap())?;
//! service.msg_use_default_timeouts(msg_id)?;
//! service.msg_send(msg_id)?;
//! assert!(service.is_timer_active());
//! # Ok::<(), MleError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Security envelope
pub mod crypto;

// Message buffers
pub mod buffer;

// Per-interface state
pub mod interface;

// Service context and pipelines
pub mod service;

// Tokio transport (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::buffer::{BufferKey, MessageBuffer, TimeoutParams};
    pub use crate::crypto::{
        KeyIdMode, KeyStore, MleKey, NeighborMap, NeighborSecurity, NeighborTable, NoNeighbors,
        SecurityHeader, StaticKeyStore,
    };
    pub use crate::interface::{ServiceInstance, TimerDefaults, TokenBucket};
    pub use crate::service::{
        MleMessage, MleService, MleServiceBuilder, ReceiveHandler, ReceiveOutcome, ServiceConfig,
    };

    #[cfg(feature = "transport")]
    pub use crate::transport::{TickScheduler, TickState, UdpTransport, run_driver};
}

// Re-export commonly used items at crate root
pub use core::{CryptoError, MleError, MleResult, ReceiveError};
pub use service::{MleService, MleServiceBuilder, ServiceConfig};

#[cfg(feature = "transport")]
pub use transport::{TickScheduler, UdpTransport, run_driver};
