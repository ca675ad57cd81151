//! Datagram types exchanged with the [`Transport`](super::Transport).

use std::net::Ipv6Addr;

use super::constants::{MLE_HOP_LIMIT, MLE_PORT};

/// Per-packet link-layer overrides carried next to an outgoing datagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketOptions {
    /// Send on this RF channel instead of the operating one.
    pub channel: Option<u8>,
    /// Send with this PAN ID instead of the operating one.
    pub pan_id: Option<u16>,
    /// Request link-layer security for this frame.
    pub link_layer_security: bool,
    /// Use the PSK with key id mode 2 at the link layer.
    pub psk_key_id_mode_2: bool,
    /// Multicast destination to be rewritten to unicast-to-parent below us.
    pub multicast_to_parent: bool,
}

/// Outgoing MLE datagram handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Interface the datagram leaves on.
    pub interface_id: i8,
    /// Link-local source derived from the interface MAC.
    pub source: Ipv6Addr,
    /// Destination address.
    pub destination: Ipv6Addr,
    /// UDP port (source and destination).
    pub port: u16,
    /// IPv6 hop limit.
    pub hop_limit: u8,
    /// Wire bytes: marker, optional security header, payload, MIC.
    pub payload: Vec<u8>,
    /// Link-layer overrides.
    pub options: PacketOptions,
}

/// Inbound datagram delivered by the socket collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    /// Interface the datagram arrived on.
    pub interface_id: i8,
    /// IPv6 source address.
    pub source: Ipv6Addr,
    /// IPv6 destination address.
    pub destination: Ipv6Addr,
    /// Raw UDP payload.
    pub payload: Vec<u8>,
    /// Frame was protected at the link layer.
    pub link_layer_secured: bool,
    /// Link quality indicator of the received frame.
    pub lqi: u8,
    /// Received signal strength in dBm.
    pub dbm: i8,
}

impl InboundDatagram {
    /// Create an inbound datagram with neutral link metrics.
    pub fn new(
        interface_id: i8,
        source: Ipv6Addr,
        destination: Ipv6Addr,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            interface_id,
            source,
            destination,
            payload,
            link_layer_secured: false,
            lqi: 0,
            dbm: 0,
        }
    }
}

impl Datagram {
    /// Create an outgoing datagram on the MLE port.
    pub fn new(interface_id: i8, source: Ipv6Addr, destination: Ipv6Addr, payload: Vec<u8>) -> Self {
        Self {
            interface_id,
            source,
            destination,
            port: MLE_PORT,
            hop_limit: MLE_HOP_LIMIT,
            payload,
            options: PacketOptions::default(),
        }
    }
}
