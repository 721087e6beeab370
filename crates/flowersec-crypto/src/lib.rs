//! Cryptographic primitives behind the flowersec handshake and record
//! layer: ECDH suites, transcript hashing, HKDF/HMAC key derivation, and
//! the AES-256-GCM record cipher. No framing or state-machine knowledge
//! lives here; see `flowersec-e2ee` for that.

pub mod error;
pub mod kdf;
pub mod record_cipher;
pub mod suite;
pub mod transcript;

pub use error::CryptoError;
pub use kdf::{compute_auth_tag, derive_rekey_key, derive_session_keys, verify_auth_tag, Direction, SessionKeys};
pub use suite::{suite_for_id, EphemeralPrivateKey, Suite, SUITE_P256_HKDF_SHA256_AES_256_GCM, SUITE_X25519_HKDF_SHA256_AES_256_GCM};
pub use transcript::{transcript_hash, Role, TranscriptInput};
