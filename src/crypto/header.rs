//! IEEE 802.15.4 auxiliary security header as carried by MLE.
//!
//! Layout:
//! ```text
//! [ control (1) | frame_counter (4, LE) | key_source (0/4/8) | key_index (0/1) ]
//! ```
//! The control byte holds the security level in bits 0-2 and the key id mode
//! in bits 3-4.

use crate::core::{AUX_HEADER_MIN_SIZE, CryptoError, MAX_SECURITY_LEVEL};

/// How the key identifier is carried in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyIdMode {
    /// Key implied by the context, no identifier.
    #[default]
    Implicit,
    /// 1-byte key index.
    Index,
    /// 4-byte key source followed by the key index.
    Source4Index,
    /// 8-byte key source followed by the key index.
    Source8Index,
}

impl KeyIdMode {
    /// Decode from the 2-bit field.
    pub fn from_bits(bits: u8) -> Result<Self, CryptoError> {
        match bits {
            0 => Ok(KeyIdMode::Implicit),
            1 => Ok(KeyIdMode::Index),
            2 => Ok(KeyIdMode::Source4Index),
            3 => Ok(KeyIdMode::Source8Index),
            other => Err(CryptoError::InvalidKeyIdMode(other)),
        }
    }

    /// The 2-bit field value.
    pub fn bits(self) -> u8 {
        match self {
            KeyIdMode::Implicit => 0,
            KeyIdMode::Index => 1,
            KeyIdMode::Source4Index => 2,
            KeyIdMode::Source8Index => 3,
        }
    }

    /// Bytes of key source carried on the wire.
    pub fn key_source_len(self) -> usize {
        match self {
            KeyIdMode::Implicit | KeyIdMode::Index => 0,
            KeyIdMode::Source4Index => 4,
            KeyIdMode::Source8Index => 8,
        }
    }

    /// Total key identifier length (source + index).
    pub fn identifier_len(self) -> usize {
        match self {
            KeyIdMode::Implicit => 0,
            other => other.key_source_len() + 1,
        }
    }
}

/// Security parameters of one MLE message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityHeader {
    /// Security level 0..=7 (0 = unsecured).
    pub security_level: u8,
    /// Key identifier mode.
    pub key_id_mode: KeyIdMode,
    /// Key index.
    pub key_index: u8,
    /// Key source; only the first `key_id_mode.key_source_len()` bytes are used.
    pub key_source: [u8; 8],
    /// Frame counter.
    pub frame_counter: u32,
}

impl SecurityHeader {
    /// Create a header, rejecting levels above 7.
    pub fn new(security_level: u8, key_id_mode: KeyIdMode) -> Result<Self, CryptoError> {
        if security_level > MAX_SECURITY_LEVEL {
            return Err(CryptoError::InvalidSecurityLevel(security_level));
        }
        Ok(Self {
            security_level,
            key_id_mode,
            ..Self::default()
        })
    }

    /// Check if the message is protected at all.
    pub fn is_secured(&self) -> bool {
        self.security_level != 0
    }

    /// Check if the payload is encrypted (levels 4..=7).
    pub fn encrypts(&self) -> bool {
        self.security_level & 0x04 != 0
    }

    /// MIC length implied by the level: 0, 4, 8 or 16 bytes.
    pub fn mic_len(&self) -> usize {
        mic_len(self.security_level)
    }

    /// Encoded size: 5, 6, 10 or 14 bytes.
    pub fn encoded_len(&self) -> usize {
        AUX_HEADER_MIN_SIZE + self.key_id_mode.identifier_len()
    }

    /// Set the key sequence, deriving source and index the way Thread does.
    pub fn set_key_sequence(&mut self, key_sequence: u32) {
        match self.key_id_mode {
            KeyIdMode::Implicit => {}
            KeyIdMode::Index => self.key_index = (key_sequence & 0x7F) as u8 + 1,
            KeyIdMode::Source4Index | KeyIdMode::Source8Index => {
                self.key_source = [0; 8];
                self.key_source[..4].copy_from_slice(&key_sequence.to_be_bytes());
                self.key_index = (key_sequence & 0x7F) as u8 + 1;
            }
        }
    }

    /// Key sequence carried by the header.
    pub fn key_sequence(&self) -> u32 {
        match self.key_id_mode {
            KeyIdMode::Implicit => 0,
            KeyIdMode::Index => u32::from(self.key_index.saturating_sub(1)),
            KeyIdMode::Source4Index | KeyIdMode::Source8Index => u32::from_be_bytes([
                self.key_source[0],
                self.key_source[1],
                self.key_source[2],
                self.key_source[3],
            ]),
        }
    }

    /// Append the encoded header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CryptoError> {
        if self.security_level > MAX_SECURITY_LEVEL {
            return Err(CryptoError::InvalidSecurityLevel(self.security_level));
        }
        out.push(self.security_level | (self.key_id_mode.bits() << 3));
        out.extend_from_slice(&self.frame_counter.to_le_bytes());
        if self.key_id_mode != KeyIdMode::Implicit {
            out.extend_from_slice(&self.key_source[..self.key_id_mode.key_source_len()]);
            out.push(self.key_index);
        }
        Ok(())
    }

    /// Decode a header from the front of `bytes`.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), CryptoError> {
        if bytes.len() < AUX_HEADER_MIN_SIZE {
            return Err(CryptoError::HeaderTooShort);
        }
        let control = bytes[0];
        let key_id_mode = KeyIdMode::from_bits((control >> 3) & 0x03)?;
        let mut header = Self {
            security_level: control & 0x07,
            key_id_mode,
            frame_counter: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            ..Self::default()
        };

        let len = header.encoded_len();
        if bytes.len() < len {
            return Err(CryptoError::HeaderTooShort);
        }
        if key_id_mode != KeyIdMode::Implicit {
            let source_len = key_id_mode.key_source_len();
            let source = &bytes[AUX_HEADER_MIN_SIZE..AUX_HEADER_MIN_SIZE + source_len];
            header.key_source[..source_len].copy_from_slice(source);
            header.key_index = bytes[len - 1];
        }
        Ok((header, len))
    }
}

/// MIC length for a security level.
pub fn mic_len(security_level: u8) -> usize {
    match security_level & 0x03 {
        0 => 0,
        1 => 4,
        2 => 8,
        _ => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_sizes() {
        for (mode, size) in [
            (KeyIdMode::Implicit, 5),
            (KeyIdMode::Index, 6),
            (KeyIdMode::Source4Index, 10),
            (KeyIdMode::Source8Index, 14),
        ] {
            let header = SecurityHeader::new(5, mode).unwrap();
            let mut out = Vec::new();
            header.encode(&mut out).unwrap();
            assert_eq!(out.len(), size);
            assert_eq!(header.encoded_len(), size);
        }
    }

    #[test]
    fn test_control_byte_and_counter_layout() {
        let mut header = SecurityHeader::new(5, KeyIdMode::Source4Index).unwrap();
        header.frame_counter = 0x0102_0304;
        header.set_key_sequence(0x0000_0010);

        let mut out = Vec::new();
        header.encode(&mut out).unwrap();

        assert_eq!(out[0], 0x15); // level 5, mode 2
        assert_eq!(&out[1..5], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&out[5..9], &[0x00, 0x00, 0x00, 0x10]);
        assert_eq!(out[9], 0x11);

        let (decoded, used) = SecurityHeader::decode(&out).unwrap();
        assert_eq!(used, 10);
        assert_eq!(decoded, header);
        assert_eq!(decoded.key_sequence(), 0x10);
    }

    #[test]
    fn test_invalid_level_rejected() {
        assert_eq!(
            SecurityHeader::new(8, KeyIdMode::Index),
            Err(CryptoError::InvalidSecurityLevel(8))
        );
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(
            SecurityHeader::decode(&[0x15, 0, 0]),
            Err(CryptoError::HeaderTooShort)
        );
        // Mode 2 needs 10 bytes
        assert_eq!(
            SecurityHeader::decode(&[0x15, 0, 0, 0, 0, 1, 2]),
            Err(CryptoError::HeaderTooShort)
        );
    }

    #[test]
    fn test_mic_lengths() {
        assert_eq!(mic_len(0), 0);
        assert_eq!(mic_len(1), 4);
        assert_eq!(mic_len(2), 8);
        assert_eq!(mic_len(3), 16);
        assert_eq!(mic_len(4), 0);
        assert_eq!(mic_len(5), 4);
        assert_eq!(mic_len(7), 16);
    }
}
