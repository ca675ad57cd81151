//! MLE key material
//!
//! AES-128 keys handed out by the [`KeyStore`](super::KeyStore) for one send
//! or one receive. Zeroized on drop.

use std::fmt;

use zeroize::Zeroize;

use crate::core::KEY_SIZE;

/// A 128-bit MLE key.
#[derive(Clone, PartialEq, Eq)]
pub struct MleKey {
    key: [u8; KEY_SIZE],
}

impl MleKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Create a key from a slice, `None` unless it is exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self { key })
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for MleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MleKey(..)")
    }
}

impl Drop for MleKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
