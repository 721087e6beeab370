use std::fmt;

/// Errors from suite negotiation, key derivation, and the AEAD record
/// cipher. Deliberately coarse on the AEAD side: an auth failure and a
/// malformed ciphertext look identical to callers, since distinguishing
/// them is an oracle.
#[derive(Debug)]
pub enum CryptoError {
    /// `suite` does not match any compiled-in suite.
    UnsupportedSuite(u16),
    /// A peer public key was the wrong length or not a valid curve point.
    InvalidPublicKey,
    /// A derived or provided symmetric key was not the length the cipher expects.
    InvalidKeyLength,
    /// AEAD encryption failed (should not happen absent a key-length bug).
    AeadSeal,
    /// AEAD decryption/authentication failed.
    AeadOpen,
    /// HKDF output length requested exceeded `255 * hash_len`.
    HkdfExpand,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::UnsupportedSuite(id) => write!(f, "unsupported cipher suite: {id}"),
            CryptoError::InvalidPublicKey => write!(f, "invalid peer public key"),
            CryptoError::InvalidKeyLength => write!(f, "invalid symmetric key length"),
            CryptoError::AeadSeal => write!(f, "aead encryption failed"),
            CryptoError::AeadOpen => write!(f, "aead authentication failed"),
            CryptoError::HkdfExpand => write!(f, "hkdf expand output length out of range"),
        }
    }
}

impl std::error::Error for CryptoError {}
