//! Outbound pipeline: payload to wire datagram.

use tracing::trace;

use crate::buffer::BufferKey;
use crate::core::{
    CryptoError, Datagram, MARKER_SECURED, MARKER_UNSECURED, MleError, MleResult,
    TLV_LL_FRAME_COUNTER, TLV_MLE_FRAME_COUNTER,
};
use crate::crypto::{KeyIdMode, KeyStore, NeighborTable, construct_aad, construct_nonce, seal};

use super::MleService;
use super::tlv::write_u32_tlv;

impl<K: KeyStore, N: NeighborTable> MleService<K, N> {
    /// Build the wire datagram for a buffer.
    ///
    /// For secured messages the key is resolved before the MLE frame counter
    /// advances, and the counter advances exactly once. The frame counter
    /// TLVs in the copy are refreshed to the values in use.
    pub(crate) fn build_datagram(&mut self, key: BufferKey) -> MleResult<Datagram> {
        let buffer = self
            .buffers
            .get(key)
            .ok_or(MleError::InvalidHandle(key.msg_id()))?;
        let interface_id = buffer.interface_id;
        let instance = self
            .registry
            .find(interface_id)
            .ok_or(MleError::InterfaceNotFound(interface_id))?;

        let source = instance.link_local();
        let mac64 = *instance.mac64();
        let destination = buffer.destination;
        let mut header = buffer.security;
        let mut options = buffer.options;
        options.multicast_to_parent = destination.is_multicast();

        let mut body = Vec::new();
        body.try_reserve_exact(buffer.len() + header.encoded_len() + header.mic_len() + 1)
            .map_err(|_| MleError::OutOfMemory)?;
        body.extend_from_slice(buffer.payload());

        let ll_counter = self.keys.link_layer_frame_counter(interface_id);
        write_u32_tlv(&mut body[1..], TLV_LL_FRAME_COUNTER, ll_counter);

        if !header.is_secured() {
            let mle_counter = self.keys.frame_counter(interface_id, false);
            write_u32_tlv(&mut body[1..], TLV_MLE_FRAME_COUNTER, mle_counter);

            let mut wire = Vec::with_capacity(body.len() + 1);
            wire.push(MARKER_UNSECURED);
            wire.extend_from_slice(&body);
            trace!(msg_id = key.msg_id(), len = wire.len(), "unsecured message built");
            return Ok(Datagram {
                options,
                port: self.config.port,
                ..Datagram::new(interface_id, source, destination, wire)
            });
        }

        if header.key_id_mode != KeyIdMode::Implicit && header.key_index == 0 {
            header.set_key_sequence(self.keys.default_key_id(interface_id));
        }
        let mle_key = self
            .keys
            .key(interface_id, &header)
            .ok_or(CryptoError::KeyUnavailable)?;
        header.frame_counter = self.keys.frame_counter(interface_id, true);
        write_u32_tlv(&mut body[1..], TLV_MLE_FRAME_COUNTER, header.frame_counter);

        let mut aux = Vec::with_capacity(header.encoded_len());
        header.encode(&mut aux)?;
        let aad = construct_aad(&source, &destination, &aux);
        let nonce = construct_nonce(&mac64, header.frame_counter, header.security_level);
        seal(&mle_key, &nonce, header.security_level, &aad, &mut body)?;

        let mut wire = Vec::with_capacity(1 + aux.len() + body.len());
        wire.push(MARKER_SECURED);
        wire.extend_from_slice(&aux);
        wire.extend_from_slice(&body);
        trace!(
            msg_id = key.msg_id(),
            frame_counter = header.frame_counter,
            level = header.security_level,
            len = wire.len(),
            "secured message built"
        );

        Ok(Datagram {
            options,
            port: self.config.port,
            ..Datagram::new(interface_id, source, destination, wire)
        })
    }
}
