//! One outgoing MLE message and its retry state.

use std::fmt;
use std::net::Ipv6Addr;

use crate::core::{PacketOptions, TimeoutHandler};
use crate::crypto::SecurityHeader;

/// Location of the Challenge TLV value inside the payload.
///
/// Stored relative to the start of the buffer so growth never invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeSlot {
    /// Offset of the first challenge byte.
    pub offset: usize,
    /// Challenge length.
    pub len: usize,
}

/// Retransmission parameters of one message, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutParams {
    /// Retries before giving up; 0 sends once and frees.
    pub retrans_max: u8,
    /// Initial retransmission timeout.
    pub timeout_init: u16,
    /// Upper bound for the backoff, 0 for none.
    pub timeout_max: u16,
    /// Random delay window before the first transmission, 0 for none.
    pub delay: u16,
}

/// An outgoing MLE message owned by the [`BufferPool`](super::BufferPool).
///
/// Byte 0 of the payload is the MLE command type; TLVs follow.
pub struct MessageBuffer {
    pub(crate) msg_id: u16,
    pub(crate) interface_id: i8,
    pub(crate) buf: Vec<u8>,
    pub(crate) buf_end: usize,
    pub(crate) destination: Ipv6Addr,
    pub(crate) security: SecurityHeader,
    pub(crate) challenge: Option<ChallengeSlot>,

    pub(crate) timeout: u16,
    pub(crate) timeout_init: u16,
    pub(crate) timeout_max: u16,
    pub(crate) retrans: u8,
    pub(crate) retrans_max: u8,
    pub(crate) delayed_response: bool,

    pub(crate) armed: bool,
    pub(crate) response_status: bool,
    pub(crate) tokens_delay: bool,
    pub(crate) tokens_priority: bool,
    pub(crate) message_sent: bool,
    pub(crate) options: PacketOptions,
    pub(crate) timeout_handler: Option<Box<dyn TimeoutHandler>>,
}

impl MessageBuffer {
    pub(crate) fn new(msg_id: u16, interface_id: i8, buf: Vec<u8>) -> Self {
        Self {
            msg_id,
            interface_id,
            buf,
            buf_end: 1,
            destination: Ipv6Addr::UNSPECIFIED,
            security: SecurityHeader::default(),
            challenge: None,
            timeout: 0,
            timeout_init: 0,
            timeout_max: 0,
            retrans: 0,
            retrans_max: 0,
            delayed_response: false,
            armed: false,
            response_status: false,
            tokens_delay: false,
            tokens_priority: false,
            message_sent: false,
            options: PacketOptions::default(),
            timeout_handler: None,
        }
    }

    /// Message id, the only external handle.
    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }

    /// Owning interface.
    pub fn interface_id(&self) -> i8 {
        self.interface_id
    }

    /// MLE command type (byte 0).
    pub fn msg_type(&self) -> u8 {
        self.buf[0]
    }

    /// Written payload: type byte followed by TLVs.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.buf_end]
    }

    pub(crate) fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.buf_end]
    }

    /// Write cursor (bytes written including the type byte).
    pub fn len(&self) -> usize {
        self.buf_end
    }

    /// Always false: the type byte is reserved from the start.
    pub fn is_empty(&self) -> bool {
        self.buf_end == 0
    }

    /// Allocated storage.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Destination address.
    pub fn destination(&self) -> Ipv6Addr {
        self.destination
    }

    /// Security parameters.
    pub fn security_header(&self) -> &SecurityHeader {
        &self.security
    }

    /// Challenge value carried by this message, if any.
    pub fn challenge(&self) -> Option<&[u8]> {
        let slot = self.challenge?;
        self.buf.get(slot.offset..slot.offset + slot.len)
    }

    /// Ticks left before the next attempt.
    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    /// Current backoff base.
    pub fn timeout_init(&self) -> u16 {
        self.timeout_init
    }

    /// Backoff ceiling.
    pub fn timeout_max(&self) -> u16 {
        self.timeout_max
    }

    /// Retries done so far.
    pub fn retrans(&self) -> u8 {
        self.retrans
    }

    /// Retry limit.
    pub fn retrans_max(&self) -> u8 {
        self.retrans_max
    }

    /// Waiting out the response jitter before the first transmission.
    pub fn is_delayed_response(&self) -> bool {
        self.delayed_response
    }

    /// Handed to the engine by `msg_send`.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// A matching Response TLV has been received.
    pub fn response_received(&self) -> bool {
        self.response_status
    }

    /// Parked waiting for tokens.
    pub fn is_token_delayed(&self) -> bool {
        self.tokens_delay
    }

    /// Bypasses the token bucket.
    pub fn is_priority(&self) -> bool {
        self.tokens_priority
    }

    /// Transmitted at least once.
    pub fn message_sent(&self) -> bool {
        self.message_sent
    }

    /// Link-layer overrides for this message.
    pub fn packet_options(&self) -> &PacketOptions {
        &self.options
    }

    pub(crate) fn apply_timeouts(&mut self, params: TimeoutParams) {
        self.retrans_max = params.retrans_max;
        self.timeout_init = params.timeout_init;
        self.timeout_max = params.timeout_max;
        // a pending response delay keeps its countdown
        if !self.delayed_response {
            self.timeout = params.timeout_init;
        }
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("msg_id", &self.msg_id)
            .field("interface_id", &self.interface_id)
            .field("len", &self.buf_end)
            .field("capacity", &self.buf.len())
            .field("destination", &self.destination)
            .field("security_level", &self.security.security_level)
            .field("timeout", &self.timeout)
            .field("timeout_init", &self.timeout_init)
            .field("retrans", &self.retrans)
            .field("retrans_max", &self.retrans_max)
            .field("delayed_response", &self.delayed_response)
            .field("tokens_delay", &self.tokens_delay)
            .field("message_sent", &self.message_sent)
            .field("has_timeout_handler", &self.timeout_handler.is_some())
            .finish()
    }
}
