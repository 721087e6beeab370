//! HKDF-SHA-256 session key derivation, HMAC-SHA-256 auth tags, and the
//! rekey schedule.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Direction a derived key or nonce prefix applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer = 0,
    ServerToClient = 1,
}

/// Everything derived from `ikm = shared_secret ‖ transcript_hash` under the PSK.
pub struct SessionKeys {
    pub c2s_key: [u8; 32],
    pub s2c_key: [u8; 32],
    pub rekey_base: [u8; 32],
    pub c2s_nonce_prefix: [u8; 4],
    pub s2c_nonce_prefix: [u8; 4],
}

fn expand(hk: &Hkdf<Sha256>, info: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    hk.expand(info, out).map_err(|_| CryptoError::HkdfExpand)
}

/// Derive all session key material for a completed handshake.
///
/// `psk` is the extract salt, `shared_secret ‖ transcript_hash` is the IKM,
/// matching `HKDF-Extract(psk, ikm)` for every downstream `HKDF-Expand`.
pub fn derive_session_keys(
    psk: &[u8; 32],
    shared_secret: &[u8],
    transcript_hash: &[u8; 32],
) -> Result<SessionKeys, CryptoError> {
    let mut ikm = Vec::with_capacity(shared_secret.len() + transcript_hash.len());
    ikm.extend_from_slice(shared_secret);
    ikm.extend_from_slice(transcript_hash);

    let hk = Hkdf::<Sha256>::new(Some(psk), &ikm);

    let mut c2s_key = [0u8; 32];
    expand(&hk, b"flowersec-e2ee-v1:c2s:key", &mut c2s_key)?;

    let mut s2c_key = [0u8; 32];
    expand(&hk, b"flowersec-e2ee-v1:s2c:key", &mut s2c_key)?;

    let mut rekey_base = [0u8; 32];
    expand(&hk, b"flowersec-e2ee-v1:rekey_base", &mut rekey_base)?;

    let mut c2s_nonce_prefix = [0u8; 4];
    expand(&hk, b"flowersec-e2ee-v1:c2s:nonce_prefix", &mut c2s_nonce_prefix)?;

    let mut s2c_nonce_prefix = [0u8; 4];
    expand(&hk, b"flowersec-e2ee-v1:s2c:nonce_prefix", &mut s2c_nonce_prefix)?;

    Ok(SessionKeys {
        c2s_key,
        s2c_key,
        rekey_base,
        c2s_nonce_prefix,
        s2c_nonce_prefix,
    })
}

/// `HMAC-SHA-256(psk, transcript_hash ‖ ts_unix_s_u64_be)`.
pub fn compute_auth_tag(psk: &[u8; 32], transcript_hash: &[u8; 32], ts_unix_s: u64) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(psk).expect("hmac accepts keys of any length");
    mac.update(transcript_hash);
    mac.update(&ts_unix_s.to_be_bytes());
    mac.finalize().into_bytes().into()
}

/// Constant-time verification of an auth tag produced by [`compute_auth_tag`].
pub fn verify_auth_tag(psk: &[u8; 32], transcript_hash: &[u8; 32], ts_unix_s: u64, tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(psk).expect("hmac accepts keys of any length");
    mac.update(transcript_hash);
    mac.update(&ts_unix_s.to_be_bytes());
    mac.verify_slice(tag).is_ok()
}

/// Derive the key a direction advances to after a rekey record at `seq`.
///
/// `salt = HMAC-SHA-256(rekey_base, transcript_hash ‖ seq_be ‖ dir)`, then
/// that salt feeds a fixed-IKM HKDF-Expand to produce the new 32-byte key.
pub fn derive_rekey_key(
    rekey_base: &[u8; 32],
    transcript_hash: &[u8; 32],
    seq: u64,
    dir: Direction,
) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(rekey_base).expect("hmac accepts keys of any length");
    mac.update(transcript_hash);
    mac.update(&seq.to_be_bytes());
    mac.update(&[dir as u8]);
    let salt: [u8; 32] = mac.finalize().into_bytes().into();

    let hk = Hkdf::<Sha256>::new(Some(&salt), b"flowersec-e2ee-v1:rekey");
    let mut key = [0u8; 32];
    expand(&hk, b"flowersec-e2ee-v1:rekey:key", &mut key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_keys_are_deterministic() {
        let psk = [7u8; 32];
        let shared = [9u8; 32];
        let th = [5u8; 32];

        let a = derive_session_keys(&psk, &shared, &th).unwrap();
        let b = derive_session_keys(&psk, &shared, &th).unwrap();
        assert_eq!(a.c2s_key, b.c2s_key);
        assert_eq!(a.s2c_key, b.s2c_key);
        assert_eq!(a.rekey_base, b.rekey_base);
        assert_eq!(a.c2s_nonce_prefix, b.c2s_nonce_prefix);
        assert_eq!(a.s2c_nonce_prefix, b.s2c_nonce_prefix);
    }

    #[test]
    fn directions_derive_distinct_keys() {
        let psk = [1u8; 32];
        let shared = [2u8; 32];
        let th = [3u8; 32];
        let keys = derive_session_keys(&psk, &shared, &th).unwrap();
        assert_ne!(keys.c2s_key, keys.s2c_key);
        assert_ne!(keys.c2s_nonce_prefix, keys.s2c_nonce_prefix);
    }

    #[test]
    fn auth_tag_roundtrips() {
        let psk = [4u8; 32];
        let th = [6u8; 32];
        let ts = 1_700_000_000u64;
        let tag = compute_auth_tag(&psk, &th, ts);
        assert!(verify_auth_tag(&psk, &th, ts, &tag));
    }

    #[test]
    fn auth_tag_rejects_wrong_timestamp() {
        let psk = [4u8; 32];
        let th = [6u8; 32];
        let tag = compute_auth_tag(&psk, &th, 1_700_000_000);
        assert!(!verify_auth_tag(&psk, &th, 1_700_000_001, &tag));
    }

    #[test]
    fn rekey_advances_deterministically_and_per_direction() {
        let rekey_base = [8u8; 32];
        let th = [2u8; 32];
        let k1 = derive_rekey_key(&rekey_base, &th, 100, Direction::ClientToServer).unwrap();
        let k2 = derive_rekey_key(&rekey_base, &th, 100, Direction::ClientToServer).unwrap();
        assert_eq!(k1, k2);

        let k_other_dir = derive_rekey_key(&rekey_base, &th, 100, Direction::ServerToClient).unwrap();
        assert_ne!(k1, k_other_dir);

        let k_other_seq = derive_rekey_key(&rekey_base, &th, 101, Direction::ClientToServer).unwrap();
        assert_ne!(k1, k_other_seq);
    }
}
