//! Per-interface service record.

use std::fmt;
use std::net::Ipv6Addr;

use crate::core::{DEFAULT_MRC, DEFAULT_MRT, DEFAULT_URT};
use crate::service::{ReceiveHandler, link_local_from_mac};

use super::token_bucket::TokenBucket;

/// Retransmission defaults of an interface, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDefaults {
    /// Unicast retransmission timeout.
    pub urt: u16,
    /// Maximum retransmission timeout.
    pub mrt: u16,
    /// Maximum retry count.
    pub mrc: u8,
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self {
            urt: DEFAULT_URT,
            mrt: DEFAULT_MRT,
            mrc: DEFAULT_MRC,
        }
    }
}

/// One registered interface.
pub struct ServiceInstance {
    interface_id: i8,
    mac64: [u8; 8],
    challenge_length: u8,
    pub(crate) receive_handler: Option<Box<dyn ReceiveHandler>>,
    pub(crate) bypass_handler: Option<Box<dyn ReceiveHandler>>,
    pub(crate) timers: TimerDefaults,
    pub(crate) token_bucket: TokenBucket,
}

impl ServiceInstance {
    pub(crate) fn new(interface_id: i8, mac64: [u8; 8], challenge_length: u8) -> Self {
        Self {
            interface_id,
            mac64,
            challenge_length,
            receive_handler: None,
            bypass_handler: None,
            timers: TimerDefaults::default(),
            token_bucket: TokenBucket::default(),
        }
    }

    /// Interface id.
    pub fn interface_id(&self) -> i8 {
        self.interface_id
    }

    /// EUI-64 of the interface, also the nonce source.
    pub fn mac64(&self) -> &[u8; 8] {
        &self.mac64
    }

    /// Length of challenges generated on this interface.
    pub fn challenge_length(&self) -> u8 {
        self.challenge_length
    }

    /// Link-local address derived from the MAC.
    pub fn link_local(&self) -> Ipv6Addr {
        link_local_from_mac(&self.mac64)
    }

    /// Retransmission defaults.
    pub fn timer_defaults(&self) -> TimerDefaults {
        self.timers
    }

    /// Token bucket state.
    pub fn token_bucket(&self) -> &TokenBucket {
        &self.token_bucket
    }

    /// Check if a normal receive handler is installed.
    pub fn has_receive_handler(&self) -> bool {
        self.receive_handler.is_some()
    }

    /// Check if a security bypass handler is installed.
    pub fn has_bypass_handler(&self) -> bool {
        self.bypass_handler.is_some()
    }

    pub(crate) fn update(&mut self, mac64: [u8; 8], challenge_length: u8) {
        self.mac64 = mac64;
        self.challenge_length = challenge_length;
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("interface_id", &self.interface_id)
            .field("mac64", &self.mac64)
            .field("challenge_length", &self.challenge_length)
            .field("timers", &self.timers)
            .field("token_bucket", &self.token_bucket)
            .field("receive_handler", &self.receive_handler.is_some())
            .field("bypass_handler", &self.bypass_handler.is_some())
            .finish()
    }
}
