//! CCM* (AES-128) envelope for MLE messages
//!
//! The security level selects the transform:
//! - 0: none
//! - 1..=3: authentication only, payload travels in clear and is folded into
//!   the authenticated data, MIC of 4/8/16 bytes
//! - 4: encryption only (CTR keystream, no MIC)
//! - 5..=7: encryption plus MIC of 4/8/16 bytes
//!
//! The AAD is `source (16) | destination (16) | auxiliary security header`.

use std::net::Ipv6Addr;

use aes::Aes128;
use ccm::Ccm;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U4, U8, U13, U16};
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::core::{CryptoError, MAX_SECURITY_LEVEL, NONCE_SIZE};

use super::header::mic_len;
use super::keys::MleKey;

type Ccm32 = Ccm<Aes128, U4, U13>;
type Ccm64 = Ccm<Aes128, U8, U13>;
type Ccm128 = Ccm<Aes128, U16, U13>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Construct the additional authenticated data for a message.
pub fn construct_aad(source: &Ipv6Addr, destination: &Ipv6Addr, aux_header: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(32 + aux_header.len());
    aad.extend_from_slice(&source.octets());
    aad.extend_from_slice(&destination.octets());
    aad.extend_from_slice(aux_header);
    aad
}

/// Protect `buffer` in place, appending the MIC.
pub fn seal(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    security_level: u8,
    aad: &[u8],
    buffer: &mut Vec<u8>,
) -> Result<(), CryptoError> {
    if security_level > MAX_SECURITY_LEVEL {
        return Err(CryptoError::InvalidSecurityLevel(security_level));
    }
    let mic = mic_len(security_level);
    let encrypt = security_level & 0x04 != 0;

    match (encrypt, mic) {
        (false, 0) => Ok(()),
        (true, 0) => {
            apply_keystream(key, nonce, buffer)?;
            Ok(())
        }
        (false, _) => {
            // Authentication only: m is empty, a = aad || payload
            let mut auth = Vec::with_capacity(aad.len() + buffer.len());
            auth.extend_from_slice(aad);
            auth.extend_from_slice(buffer);
            let tag = seal_detached(key, nonce, mic, &auth, &mut [])?;
            buffer.extend_from_slice(&tag);
            Ok(())
        }
        (true, _) => {
            let tag = seal_detached(key, nonce, mic, aad, buffer)?;
            buffer.extend_from_slice(&tag);
            Ok(())
        }
    }
}

/// Verify and decrypt `buffer` in place, removing the MIC.
///
/// Fails closed: on error the buffer contents must be discarded.
pub fn open(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    security_level: u8,
    aad: &[u8],
    buffer: &mut Vec<u8>,
) -> Result<(), CryptoError> {
    if security_level > MAX_SECURITY_LEVEL {
        return Err(CryptoError::InvalidSecurityLevel(security_level));
    }
    let mic = mic_len(security_level);
    let encrypt = security_level & 0x04 != 0;

    if buffer.len() < mic {
        return Err(CryptoError::AuthenticationFailed);
    }
    let tag = buffer.split_off(buffer.len() - mic);

    match (encrypt, mic) {
        (false, 0) => Ok(()),
        (true, 0) => apply_keystream(key, nonce, buffer),
        (false, _) => {
            let mut auth = Vec::with_capacity(aad.len() + buffer.len());
            auth.extend_from_slice(aad);
            auth.extend_from_slice(buffer);
            open_detached(key, nonce, mic, &auth, &mut [], &tag)
        }
        (true, _) => open_detached(key, nonce, mic, aad, buffer, &tag).inspect_err(|_| {
            buffer.clear();
        }),
    }
}

fn seal_detached(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    mic: usize,
    aad: &[u8],
    msg: &mut [u8],
) -> Result<Vec<u8>, CryptoError> {
    match mic {
        4 => seal_with::<Ccm32>(key, nonce, aad, msg),
        8 => seal_with::<Ccm64>(key, nonce, aad, msg),
        16 => seal_with::<Ccm128>(key, nonce, aad, msg),
        _ => Err(CryptoError::EncryptionFailed),
    }
}

fn open_detached(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    mic: usize,
    aad: &[u8],
    msg: &mut [u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    match mic {
        4 => open_with::<Ccm32>(key, nonce, aad, msg, tag),
        8 => open_with::<Ccm64>(key, nonce, aad, msg, tag),
        16 => open_with::<Ccm128>(key, nonce, aad, msg, tag),
        _ => Err(CryptoError::AuthenticationFailed),
    }
}

fn seal_with<C: AeadInPlace + KeyInit>(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    msg: &mut [u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::EncryptionFailed)?;
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, msg)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(tag.to_vec())
}

fn open_with<C: AeadInPlace + KeyInit>(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    msg: &mut [u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    let cipher =
        C::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::AuthenticationFailed)?;
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            aad,
            msg,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// CCM* with M = 0: plain CTR starting at counter block A1.
fn apply_keystream(
    key: &MleKey,
    nonce: &[u8; NONCE_SIZE],
    buffer: &mut [u8],
) -> Result<(), CryptoError> {
    let mut iv = [0u8; 16];
    iv[0] = 0x01; // L' = L - 1, with L = 2
    iv[1..14].copy_from_slice(nonce);
    iv[15] = 0x01;

    let mut cipher = Aes128Ctr::new_from_slices(key.as_bytes(), &iv)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    cipher.apply_keystream(buffer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::nonce::construct_nonce;

    fn key() -> MleKey {
        MleKey::from_bytes([0x42; 16])
    }

    fn nonce() -> [u8; NONCE_SIZE] {
        construct_nonce(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77], 1, 5)
    }

    fn aad() -> Vec<u8> {
        let src: Ipv6Addr = "fe80::211:2233:4455:6677".parse().unwrap();
        let dst: Ipv6Addr = "ff02::1".parse().unwrap();
        construct_aad(&src, &dst, &[0x15, 1, 0, 0, 0])
    }

    #[test]
    fn test_aad_construction() {
        let aad = aad();
        assert_eq!(aad.len(), 37);
        assert_eq!(&aad[0..2], &[0xfe, 0x80]);
        assert_eq!(&aad[16..18], &[0xff, 0x02]);
        assert_eq!(aad[32], 0x15);
    }

    #[test]
    fn test_seal_open_roundtrip_all_levels() {
        let plaintext = b"\x10\x03\x08challenge-bytes".to_vec();
        for level in 1..=MAX_SECURITY_LEVEL {
            let mut buffer = plaintext.clone();
            seal(&key(), &nonce(), level, &aad(), &mut buffer).unwrap();
            assert_eq!(buffer.len(), plaintext.len() + mic_len(level), "level {level}");
            if level & 0x04 != 0 {
                assert_ne!(&buffer[..plaintext.len()], &plaintext[..]);
            } else {
                assert_eq!(&buffer[..plaintext.len()], &plaintext[..]);
            }

            open(&key(), &nonce(), level, &aad(), &mut buffer).unwrap();
            assert_eq!(buffer, plaintext, "level {level}");
        }
    }

    #[test]
    fn test_flipped_byte_fails() {
        for level in [1u8, 2, 3, 5, 6, 7] {
            let mut sealed = b"payload".to_vec();
            seal(&key(), &nonce(), level, &aad(), &mut sealed).unwrap();

            for i in 0..sealed.len() {
                let mut tampered = sealed.clone();
                tampered[i] ^= 0x01;
                let result = open(&key(), &nonce(), level, &aad(), &mut tampered);
                assert_eq!(result, Err(CryptoError::AuthenticationFailed), "level {level} byte {i}");
            }
        }
    }

    #[test]
    fn test_wrong_aad_fails() {
        let mut sealed = b"payload".to_vec();
        seal(&key(), &nonce(), 5, &aad(), &mut sealed).unwrap();

        let mut other_aad = aad();
        other_aad[0] ^= 0xFF;
        assert_eq!(
            open(&key(), &nonce(), 5, &other_aad, &mut sealed),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let mut sealed = b"payload".to_vec();
        seal(&key(), &nonce(), 7, &aad(), &mut sealed).unwrap();
        let other = MleKey::from_bytes([0x43; 16]);
        assert!(open(&other, &nonce(), 7, &aad(), &mut sealed).is_err());
    }

    #[test]
    fn test_truncated_mic_fails() {
        let mut short = vec![0u8; 3];
        assert_eq!(
            open(&key(), &nonce(), 5, &aad(), &mut short),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_level_zero_is_identity() {
        let mut buffer = b"clear".to_vec();
        seal(&key(), &nonce(), 0, &aad(), &mut buffer).unwrap();
        assert_eq!(buffer, b"clear");
    }

    #[test]
    fn test_invalid_level() {
        let mut buffer = b"x".to_vec();
        assert_eq!(
            seal(&key(), &nonce(), 8, &aad(), &mut buffer),
            Err(CryptoError::InvalidSecurityLevel(8))
        );
    }
}
