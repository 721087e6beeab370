//! AES-256-GCM record sealing/opening. Nonce is the direction's 4-byte
//! prefix concatenated with the 8-byte big-endian sequence number; AAD is
//! the caller-supplied record header bytes.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::error::CryptoError;

fn build_nonce(prefix: &[u8; 4], seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(prefix);
    nonce[4..].copy_from_slice(&seq.to_be_bytes());
    nonce
}

/// Encrypt `plaintext` under `key`, binding `aad` (the record header).
pub fn seal(
    key: &[u8; 32],
    nonce_prefix: &[u8; 4],
    seq: u64,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
    let nonce_bytes = build_nonce(nonce_prefix, seq);
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadSeal)
}

/// Decrypt and authenticate `ciphertext` (tag appended) under `key`.
pub fn open(
    key: &[u8; 32],
    nonce_prefix: &[u8; 4],
    seq: u64,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
    let nonce_bytes = build_nonce(nonce_prefix, seq);
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadOpen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_roundtrips() {
        let key = [1u8; 32];
        let prefix = [2u8; 4];
        let aad = b"record-header";
        let plaintext = b"hello flowersec";

        let ciphertext = seal(&key, &prefix, 1, aad, plaintext).unwrap();
        let opened = open(&key, &prefix, 1, aad, &ciphertext).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_sequence_fails_authentication() {
        let key = [1u8; 32];
        let prefix = [2u8; 4];
        let aad = b"record-header";
        let ciphertext = seal(&key, &prefix, 1, aad, b"payload").unwrap();
        assert!(open(&key, &prefix, 2, aad, &ciphertext).is_err());
    }

    #[test]
    fn tampered_aad_fails_authentication() {
        let key = [1u8; 32];
        let prefix = [2u8; 4];
        let ciphertext = seal(&key, &prefix, 1, b"header-a", b"payload").unwrap();
        assert!(open(&key, &prefix, 1, b"header-b", &ciphertext).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = [1u8; 32];
        let prefix = [2u8; 4];
        let aad = b"record-header";
        let mut ciphertext = seal(&key, &prefix, 1, aad, b"payload").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(open(&key, &prefix, 1, aad, &ciphertext).is_err());
    }

    #[test]
    fn empty_plaintext_is_supported_for_ping_records() {
        let key = [1u8; 32];
        let prefix = [2u8; 4];
        let aad = b"record-header";
        let ciphertext = seal(&key, &prefix, 1, aad, b"").unwrap();
        let opened = open(&key, &prefix, 1, aad, &ciphertext).unwrap();
        assert!(opened.is_empty());
    }
}
