//! Glue between the FSEC record header and `flowersec_crypto`'s AEAD calls:
//! AAD is always the 18-byte record header, nonce is prefix ‖ seq.
//!
//! The header's `cipherlen` field must be authenticated as part of AAD and
//! must equal the ciphertext length actually written to the wire, so a
//! seal always fixes `cipherlen` from the plaintext length *before*
//! building the header used as AAD.

use crate::config::RecordConfig;
use crate::frame::{RecordFlag, RecordHeader};
use flowersec_crypto::{record_cipher, CryptoError};

pub fn seal_record(key: &[u8; 32], nonce_prefix: &[u8; 4], header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    record_cipher::seal(key, nonce_prefix, header.seq, &header.bytes, plaintext)
}

pub fn open_record(key: &[u8; 32], nonce_prefix: &[u8; 4], header: &RecordHeader, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    record_cipher::open(key, nonce_prefix, header.seq, &header.bytes, ciphertext)
}

/// Seal `plaintext` and build the matching record header in one step, so
/// the header used as AAD always carries the real ciphertext length.
pub fn seal_record_framed(
    key: &[u8; 32],
    nonce_prefix: &[u8; 4],
    flag: RecordFlag,
    seq: u64,
    plaintext: &[u8],
) -> Result<(RecordHeader, Vec<u8>), CryptoError> {
    let cipherlen = (plaintext.len() + RecordConfig::TAG_LEN) as u32;
    let header = RecordHeader::build(flag, seq, cipherlen);
    let ciphertext = record_cipher::seal(key, nonce_prefix, seq, &header.bytes, plaintext)?;
    Ok((header, ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_seal_header_cipherlen_matches_ciphertext() {
        let key = [1u8; 32];
        let prefix = [2u8; 4];
        let (header, ciphertext) = seal_record_framed(&key, &prefix, RecordFlag::App, 3, b"hello").unwrap();
        assert_eq!(header.cipherlen as usize, ciphertext.len());
        let opened = open_record(&key, &prefix, &header, &ciphertext).unwrap();
        assert_eq!(opened, b"hello");
    }
}
