//! Cipher suite negotiation. Each suite is an ECDH curve paired with the
//! fixed HKDF-SHA-256/AES-256-GCM transform used everywhere downstream;
//! the suite only varies the key-exchange half.

use rand::rngs::OsRng;

use crate::error::CryptoError;

/// `X25519_HKDF_SHA256_AES_256_GCM`. 32-byte ephemeral public keys.
pub const SUITE_X25519_HKDF_SHA256_AES_256_GCM: u16 = 1;

/// `P256_HKDF_SHA256_AES_256_GCM`. 65-byte uncompressed SEC1 ephemeral public keys.
pub const SUITE_P256_HKDF_SHA256_AES_256_GCM: u16 = 2;

/// A single-use ECDH private key, consumed by `diffie_hellman`.
pub trait EphemeralPrivateKey: Send {
    fn diffie_hellman(self: Box<Self>, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// An ECDH suite: generates an ephemeral keypair and knows its public key
/// length so callers can validate peer keys before touching curve math.
pub trait Suite: Send + Sync {
    fn suite_id(&self) -> u16;
    fn public_key_len(&self) -> usize;
    fn generate_ephemeral(&self) -> (Box<dyn EphemeralPrivateKey>, Vec<u8>);
}

/// Look up the suite implementation for a wire suite id.
pub fn suite_for_id(id: u16) -> Result<Box<dyn Suite>, CryptoError> {
    match id {
        SUITE_X25519_HKDF_SHA256_AES_256_GCM => Ok(Box::new(X25519Suite)),
        SUITE_P256_HKDF_SHA256_AES_256_GCM => Ok(Box::new(P256Suite)),
        other => Err(CryptoError::UnsupportedSuite(other)),
    }
}

pub struct X25519Suite;

struct X25519Private(x25519_dalek::EphemeralSecret);

impl Suite for X25519Suite {
    fn suite_id(&self) -> u16 {
        SUITE_X25519_HKDF_SHA256_AES_256_GCM
    }

    fn public_key_len(&self) -> usize {
        32
    }

    fn generate_ephemeral(&self) -> (Box<dyn EphemeralPrivateKey>, Vec<u8>) {
        let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        (Box::new(X25519Private(secret)), public.as_bytes().to_vec())
    }
}

impl EphemeralPrivateKey for X25519Private {
    fn diffie_hellman(self: Box<Self>, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let bytes: [u8; 32] = peer_public
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let peer = x25519_dalek::PublicKey::from(bytes);
        let shared = self.0.diffie_hellman(&peer);
        Ok(shared.as_bytes().to_vec())
    }
}

pub struct P256Suite;

struct P256Private(p256::ecdh::EphemeralSecret);

impl Suite for P256Suite {
    fn suite_id(&self) -> u16 {
        SUITE_P256_HKDF_SHA256_AES_256_GCM
    }

    fn public_key_len(&self) -> usize {
        65
    }

    fn generate_ephemeral(&self) -> (Box<dyn EphemeralPrivateKey>, Vec<u8>) {
        let secret = p256::ecdh::EphemeralSecret::random(&mut OsRng);
        let public = p256::EncodedPoint::from(secret.public_key());
        (Box::new(P256Private(secret)), public.as_bytes().to_vec())
    }
}

impl EphemeralPrivateKey for P256Private {
    fn diffie_hellman(self: Box<Self>, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let point =
            p256::EncodedPoint::from_bytes(peer_public).map_err(|_| CryptoError::InvalidPublicKey)?;
        let peer_key: Option<p256::PublicKey> =
            Option::from(p256::PublicKey::from_encoded_point(&point));
        let peer_key = peer_key.ok_or(CryptoError::InvalidPublicKey)?;
        let shared = self.0.diffie_hellman(&peer_key);
        Ok(shared.raw_secret_bytes().to_vec())
    }
}
