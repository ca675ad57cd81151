//! Decoded inbound messages and their handler.

use std::net::Ipv6Addr;

use crate::crypto::SecurityHeader;

use super::tlv::{TlvIter, find_tlv};

/// An MLE message that passed the security envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MleMessage {
    /// Interface the message arrived on.
    pub interface_id: i8,
    /// Sender's link-local address.
    pub source: Ipv6Addr,
    /// Destination address.
    pub destination: Ipv6Addr,
    /// MLE command type.
    pub msg_type: u8,
    /// TLVs following the command type.
    pub tlvs: Vec<u8>,
    /// Pending message whose challenge this message answered.
    pub response_to: Option<u16>,
    /// Frame was protected at the link layer.
    pub link_layer_secured: bool,
    /// Link quality indicator.
    pub lqi: u8,
    /// Signal strength in dBm.
    pub dbm: i8,
}

impl MleMessage {
    /// Value of the first TLV of `tlv_type`.
    pub fn tlv(&self, tlv_type: u8) -> Option<&[u8]> {
        find_tlv(&self.tlvs, tlv_type).map(|range| &self.tlvs[range])
    }

    /// All `(type, value)` pairs.
    pub fn iter_tlvs(&self) -> impl Iterator<Item = (u8, &[u8])> {
        TlvIter::new(&self.tlvs).map(|(t, range)| (t, &self.tlvs[range]))
    }
}

/// Receiver of decoded messages for one interface.
pub trait ReceiveHandler {
    /// Called once per accepted message. `security` is `None` for messages
    /// that arrived unsecured.
    fn on_receive(&mut self, message: &MleMessage, security: Option<&SecurityHeader>);
}

impl<F> ReceiveHandler for F
where
    F: FnMut(&MleMessage, Option<&SecurityHeader>),
{
    fn on_receive(&mut self, message: &MleMessage, security: Option<&SecurityHeader>) {
        self(message, security)
    }
}
