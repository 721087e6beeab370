use std::fmt;

use flowersec_crypto::CryptoError;
use flowersec_wire::FrameError;

/// Errors from the handshake state machines and the record layer. Variant
/// names match the closed error-code enumeration handshake/record peers
/// are expected to surface.
#[derive(Debug)]
pub enum E2eeError {
    InvalidVersion { expected: u8, actual: u8 },
    InvalidRole(u8),
    ChannelIdMismatch,
    UnsupportedSuite(u16),
    InvalidPublicKeyLength { expected: usize, actual: usize },
    TooManyPendingHandshakes,
    UnknownHandshakeId,
    TimestampOutOfSkew,
    TimestampAfterInitExp,
    AuthTagMismatch,
    HandshakeNotFinished,
    RecordBadSeq { expected: u64, actual: u64 },
    RecordBadFlag(u8),
    RecordDecryptFailed,
    RecordTooLarge { len: u32, max: u32 },
    Closed,
    Frame(FrameError),
    Crypto(CryptoError),
}

impl fmt::Display for E2eeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            E2eeError::InvalidVersion { expected, actual } => {
                write!(f, "invalid_version: expected {expected}, got {actual}")
            }
            E2eeError::InvalidRole(r) => write!(f, "invalid role in handshake message: {r}"),
            E2eeError::ChannelIdMismatch => write!(f, "channel_id in handshake did not match expected"),
            E2eeError::UnsupportedSuite(id) => write!(f, "invalid_suite: {id}"),
            E2eeError::InvalidPublicKeyLength { expected, actual } => {
                write!(f, "ephemeral public key length {actual} does not match suite's {expected}")
            }
            E2eeError::TooManyPendingHandshakes => write!(f, "too_many_pending_handshakes"),
            E2eeError::UnknownHandshakeId => write!(f, "ack referenced an unknown or expired handshake_id"),
            E2eeError::TimestampOutOfSkew => write!(f, "timestamp_out_of_skew"),
            E2eeError::TimestampAfterInitExp => write!(f, "timestamp_after_init_exp"),
            E2eeError::AuthTagMismatch => write!(f, "auth_tag_mismatch"),
            E2eeError::HandshakeNotFinished => write!(f, "handshake_not_finished"),
            E2eeError::RecordBadSeq { expected, actual } => {
                write!(f, "record_bad_seq: expected {expected}, got {actual}")
            }
            E2eeError::RecordBadFlag(flag) => write!(f, "record_bad_flag: {flag}"),
            E2eeError::RecordDecryptFailed => write!(f, "record_decrypt_failed"),
            E2eeError::RecordTooLarge { len, max } => {
                write!(f, "record_too_large: {len} exceeds max {max}")
            }
            E2eeError::Closed => write!(f, "secure channel is closed"),
            E2eeError::Frame(e) => write!(f, "frame error: {e}"),
            E2eeError::Crypto(e) => write!(f, "crypto error: {e}"),
        }
    }
}

impl std::error::Error for E2eeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            E2eeError::Frame(e) => Some(e),
            E2eeError::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for E2eeError {
    fn from(e: FrameError) -> Self {
        E2eeError::Frame(e)
    }
}

impl From<CryptoError> for E2eeError {
    fn from(e: CryptoError) -> Self {
        E2eeError::Crypto(e)
    }
}
