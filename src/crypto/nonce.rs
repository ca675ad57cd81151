//! Nonce construction for CCM*
//!
//! MLE nonces are 13 bytes:
//! - Sender MAC64 (8 bytes)
//! - Frame counter (4 bytes, big-endian)
//! - Security level (1 byte)

use crate::core::NONCE_SIZE;

/// Construct a 13-byte CCM* nonce.
///
/// Layout:
/// ```text
/// [ mac64 (8) | frame_counter (4, BE) | security_level (1) ]
/// ```
pub fn construct_nonce(mac64: &[u8; 8], frame_counter: u32, security_level: u8) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];

    nonce[0..8].copy_from_slice(mac64);
    nonce[8..12].copy_from_slice(&frame_counter.to_be_bytes());
    nonce[12] = security_level;

    nonce
}

/// Parse a nonce back into its components.
///
/// Useful for debugging and testing.
pub fn parse_nonce(nonce: &[u8; NONCE_SIZE]) -> ([u8; 8], u32, u8) {
    let mut mac64 = [0u8; 8];
    mac64.copy_from_slice(&nonce[0..8]);
    let frame_counter = u32::from_be_bytes([nonce[8], nonce[9], nonce[10], nonce[11]]);
    (mac64, frame_counter, nonce[12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_construction() {
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let nonce = construct_nonce(&mac, 0x0A0B_0C0D, 5);

        assert_eq!(&nonce[0..8], &mac);
        assert_eq!(&nonce[8..12], &[0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(nonce[12], 5);
    }

    #[test]
    fn test_nonce_parse() {
        let mac = [0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04];
        let nonce = construct_nonce(&mac, 42, 7);
        assert_eq!(parse_nonce(&nonce), (mac, 42, 7));
    }
}
