//! Inbound pipeline: datagram to handler.
//!
//! Every failure is a silent drop towards the peer. The reason is returned
//! to the caller and logged.

use std::net::Ipv6Addr;

use tracing::{debug, trace, warn};

use crate::core::{
    CryptoError, InboundDatagram, MARKER_SECURED, MARKER_UNSECURED, ReceiveError, TLV_RESPONSE,
};
use crate::crypto::{
    KeyStore, NeighborTable, ReplayVerdict, SecurityHeader, check_frame_counter, construct_aad,
    construct_nonce, open,
};

use super::MleService;
use super::address::{is_link_local_scope, is_link_local_unicast, mac_from_link_local};
use super::handler::MleMessage;
use super::tlv::{find_tlv, is_well_formed};

/// What happened to an accepted datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Delivered to the interface's receive handler.
    Delivered,
    /// Unsecured message delivered to the security bypass handler.
    Bypassed,
    /// Valid, but no handler is installed.
    Unhandled,
}

impl<K: KeyStore, N: NeighborTable> MleService<K, N> {
    /// Process one inbound datagram.
    pub fn receive(&mut self, datagram: InboundDatagram) -> Result<ReceiveOutcome, ReceiveError> {
        let result = self.receive_inner(datagram);
        match &result {
            Ok(outcome) => trace!(?outcome, "datagram accepted"),
            Err(ReceiveError::Security(err)) => warn!(error = %err, "secured datagram dropped"),
            Err(err) => debug!(error = %err, "datagram dropped"),
        }
        result
    }

    fn receive_inner(&mut self, datagram: InboundDatagram) -> Result<ReceiveOutcome, ReceiveError> {
        let InboundDatagram {
            interface_id,
            source,
            destination,
            payload,
            link_layer_secured,
            lqi,
            dbm,
        } = datagram;

        if !is_link_local_unicast(&source) || !is_link_local_scope(&destination) {
            return Err(ReceiveError::NotLinkLocal);
        }
        if self.registry.find(interface_id).is_none() {
            return Err(ReceiveError::UnknownInterface(interface_id));
        }
        let (&marker, rest) = payload.split_first().ok_or(ReceiveError::Empty)?;

        let (body, security, bypass) = match marker {
            MARKER_UNSECURED => {
                let level = self.keys.security_level(interface_id).unwrap_or(0);
                if level == 0 {
                    (rest.to_vec(), None, false)
                } else if self
                    .registry
                    .find(interface_id)
                    .is_some_and(|instance| instance.has_bypass_handler())
                {
                    (rest.to_vec(), None, true)
                } else {
                    return Err(ReceiveError::SecurityRequired);
                }
            }
            MARKER_SECURED => {
                let (header, body) = self.unprotect(interface_id, &source, &destination, rest)?;
                (body, Some(header), false)
            }
            other => return Err(ReceiveError::UnknownMarker(other)),
        };

        let (&msg_type, tlvs) = body.split_first().ok_or(ReceiveError::Malformed)?;
        if !is_well_formed(tlvs) {
            return Err(ReceiveError::Malformed);
        }

        let response_to = find_tlv(tlvs, TLV_RESPONSE)
            .and_then(|range| self.buffers.find_for_response(&tlvs[range]));
        if let Some(msg_id) = response_to {
            if let Some(buffer) = self.buffers.find_mut(msg_id) {
                buffer.response_status = true;
            }
            debug!(msg_id, interface_id, "response matched");
        }

        let message = MleMessage {
            interface_id,
            source,
            destination,
            msg_type,
            tlvs: tlvs.to_vec(),
            response_to,
            link_layer_secured,
            lqi,
            dbm,
        };

        let Some(instance) = self.registry.find_mut(interface_id) else {
            return Err(ReceiveError::UnknownInterface(interface_id));
        };
        let handler = if bypass {
            instance.bypass_handler.as_mut()
        } else {
            instance.receive_handler.as_mut()
        };
        match handler {
            Some(handler) => {
                handler.on_receive(&message, security.as_ref());
                Ok(if bypass {
                    ReceiveOutcome::Bypassed
                } else {
                    ReceiveOutcome::Delivered
                })
            }
            None => Ok(ReceiveOutcome::Unhandled),
        }
    }

    /// Verify and decrypt a secured datagram, then run the anti-replay check.
    fn unprotect(
        &mut self,
        interface_id: i8,
        source: &Ipv6Addr,
        destination: &Ipv6Addr,
        bytes: &[u8],
    ) -> Result<(SecurityHeader, Vec<u8>), ReceiveError> {
        let (header, header_len) = SecurityHeader::decode(bytes)?;
        if !header.is_secured() {
            return Err(CryptoError::InvalidSecurityLevel(0).into());
        }
        let key = self
            .keys
            .key(interface_id, &header)
            .ok_or(CryptoError::KeyUnavailable)?;

        let (aux, ciphertext) = bytes.split_at(header_len);
        let aad = construct_aad(source, destination, aux);
        let nonce = construct_nonce(
            &mac_from_link_local(source),
            header.frame_counter,
            header.security_level,
        );
        let mut body = ciphertext.to_vec();
        open(&key, &nonce, header.security_level, &aad, &mut body)?;

        if self.config.frame_counter_check {
            let accept_invalid = self.config.accept_invalid_frame_counter;
            if let Some(neighbor) = self.neighbors.neighbor_security(interface_id, source) {
                let verdict = check_frame_counter(
                    neighbor,
                    header.frame_counter,
                    header.key_sequence(),
                    accept_invalid,
                )?;
                match verdict {
                    ReplayVerdict::Fresh => {}
                    ReplayVerdict::Resynchronised => {
                        debug!(%source, frame_counter = header.frame_counter, "neighbor resynchronised");
                    }
                    ReplayVerdict::Overridden => {
                        warn!(%source, frame_counter = header.frame_counter, "stale frame counter accepted");
                    }
                }
            }
        }

        Ok((header, body))
    }
}
