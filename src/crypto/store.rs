//! Key and frame counter store.

use std::collections::HashMap;

use super::header::{KeyIdMode, SecurityHeader};
use super::keys::MleKey;

/// Per-interface symmetric key and frame counter source.
///
/// Key rotation lives behind this trait; the service only asks for the key
/// matching a header and for the counter to put in it.
pub trait KeyStore {
    /// Security level for outbound messages, `None` if the interface has no
    /// security context at all.
    fn security_level(&self, interface_id: i8) -> Option<u8>;

    /// Key matching the header's key identifier.
    fn key(&self, interface_id: i8, header: &SecurityHeader) -> Option<MleKey>;

    /// Current MLE frame counter. With `advance` the stored value moves on by
    /// one and the pre-increment value is returned.
    fn frame_counter(&mut self, interface_id: i8, advance: bool) -> u32;

    /// Key sequence of the active key.
    fn default_key_id(&self, interface_id: i8) -> u32;

    /// Current link-layer frame counter.
    fn link_layer_frame_counter(&self, interface_id: i8) -> u32;
}

#[derive(Debug, Default)]
struct InterfaceKeys {
    security_level: u8,
    keys: HashMap<u32, MleKey>,
    key_sequence: u32,
    frame_counter: u32,
    link_layer_frame_counter: u32,
}

/// In-memory [`KeyStore`] keyed by key sequence.
#[derive(Debug, Default)]
pub struct StaticKeyStore {
    interfaces: HashMap<i8, InterfaceKeys>,
}

impl StaticKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or reset) an interface with the given outbound security level.
    pub fn add_interface(&mut self, interface_id: i8, security_level: u8) {
        self.interfaces.insert(
            interface_id,
            InterfaceKeys {
                security_level,
                ..InterfaceKeys::default()
            },
        );
    }

    /// Drop an interface's security context.
    pub fn remove_interface(&mut self, interface_id: i8) {
        self.interfaces.remove(&interface_id);
    }

    /// Install a key for a key sequence.
    pub fn insert_key(&mut self, interface_id: i8, key_sequence: u32, key: MleKey) {
        if let Some(entry) = self.interfaces.get_mut(&interface_id) {
            entry.keys.insert(key_sequence, key);
        }
    }

    /// Select the active key sequence.
    pub fn set_default_key_id(&mut self, interface_id: i8, key_sequence: u32) {
        if let Some(entry) = self.interfaces.get_mut(&interface_id) {
            entry.key_sequence = key_sequence;
        }
    }

    /// Set the next MLE frame counter.
    pub fn set_frame_counter(&mut self, interface_id: i8, frame_counter: u32) {
        if let Some(entry) = self.interfaces.get_mut(&interface_id) {
            entry.frame_counter = frame_counter;
        }
    }

    /// Set the link-layer frame counter.
    pub fn set_link_layer_frame_counter(&mut self, interface_id: i8, frame_counter: u32) {
        if let Some(entry) = self.interfaces.get_mut(&interface_id) {
            entry.link_layer_frame_counter = frame_counter;
        }
    }
}

impl KeyStore for StaticKeyStore {
    fn security_level(&self, interface_id: i8) -> Option<u8> {
        self.interfaces.get(&interface_id).map(|e| e.security_level)
    }

    fn key(&self, interface_id: i8, header: &SecurityHeader) -> Option<MleKey> {
        let entry = self.interfaces.get(&interface_id)?;
        let sequence = match header.key_id_mode {
            KeyIdMode::Implicit => entry.key_sequence,
            _ => header.key_sequence(),
        };
        entry.keys.get(&sequence).cloned()
    }

    fn frame_counter(&mut self, interface_id: i8, advance: bool) -> u32 {
        let Some(entry) = self.interfaces.get_mut(&interface_id) else {
            return 0;
        };
        let current = entry.frame_counter;
        if advance {
            entry.frame_counter = entry.frame_counter.wrapping_add(1);
        }
        current
    }

    fn default_key_id(&self, interface_id: i8) -> u32 {
        self.interfaces
            .get(&interface_id)
            .map_or(0, |e| e.key_sequence)
    }

    fn link_layer_frame_counter(&self, interface_id: i8) -> u32 {
        self.interfaces
            .get(&interface_id)
            .map_or(0, |e| e.link_layer_frame_counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StaticKeyStore {
        let mut store = StaticKeyStore::new();
        store.add_interface(1, 5);
        store.insert_key(1, 0, MleKey::from_bytes([0x11; 16]));
        store.insert_key(1, 1, MleKey::from_bytes([0x22; 16]));
        store
    }

    #[test]
    fn test_unknown_interface() {
        let mut store = store();
        assert_eq!(store.security_level(9), None);
        assert_eq!(store.frame_counter(9, true), 0);
        assert!(store.key(9, &SecurityHeader::default()).is_none());
    }

    #[test]
    fn test_frame_counter_advances_once() {
        let mut store = store();
        store.set_frame_counter(1, 10);
        assert_eq!(store.frame_counter(1, false), 10);
        assert_eq!(store.frame_counter(1, true), 10);
        assert_eq!(store.frame_counter(1, false), 11);
    }

    #[test]
    fn test_key_selected_by_header_sequence() {
        let store = store();
        let mut header = SecurityHeader::new(5, KeyIdMode::Source4Index).unwrap();
        header.set_key_sequence(1);
        assert_eq!(store.key(1, &header).unwrap().as_bytes(), &[0x22; 16]);

        header.set_key_sequence(7);
        assert!(store.key(1, &header).is_none());
    }

    #[test]
    fn test_implicit_uses_default_key() {
        let mut store = store();
        let header = SecurityHeader::new(5, KeyIdMode::Implicit).unwrap();
        assert_eq!(store.key(1, &header).unwrap().as_bytes(), &[0x11; 16]);

        store.set_default_key_id(1, 1);
        assert_eq!(store.key(1, &header).unwrap().as_bytes(), &[0x22; 16]);
        assert_eq!(store.default_key_id(1), 1);
    }
}
