use std::time::Duration;

use flowersec_crypto::{SUITE_P256_HKDF_SHA256_AES_256_GCM, SUITE_X25519_HKDF_SHA256_AES_256_GCM};

/// Tunable parameters for the handshake state machines and cache.
/// Constructed explicitly by the caller; no global singleton.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Acceptable clock skew between peers for Ack timestamp validation.
    pub clock_skew: Duration,
    /// How long a cached server-side handshake entry survives without an Ack.
    pub cache_ttl: Duration,
    /// Maximum number of pending (Resp sent, Ack not yet received) handshakes.
    pub cache_cap: usize,
    /// Suites the server will accept in an Init.
    pub allowed_suites: Vec<u16>,
    /// Largest handshake frame payload accepted, in bytes.
    pub max_handshake_payload: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            clock_skew: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
            cache_cap: 4096,
            allowed_suites: vec![
                SUITE_X25519_HKDF_SHA256_AES_256_GCM,
                SUITE_P256_HKDF_SHA256_AES_256_GCM,
            ],
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// Tunable parameters for the post-handshake record layer.
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Largest complete record (header + ciphertext + tag) either side will
    /// accept; oversized incoming records fail the session.
    pub max_record_bytes: u32,
    /// Bound on the plaintext bytes queued for an unread `read()` result.
    pub recv_buffer_bytes: usize,
}

impl RecordConfig {
    /// Record header size: `"FSEC" ‖ version(1) ‖ flags(1) ‖ seq(8) ‖ cipherlen(4)`.
    pub const HEADER_LEN: usize = 18;
    /// AES-256-GCM appends a 16-byte authentication tag.
    pub const TAG_LEN: usize = 16;

    pub fn max_plaintext_len(&self) -> usize {
        self.max_record_bytes as usize - Self::HEADER_LEN - Self::TAG_LEN
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: 1024 * 1024,
            recv_buffer_bytes: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_plaintext_len_accounts_for_header_and_tag() {
        let config = RecordConfig {
            max_record_bytes: 1024,
            recv_buffer_bytes: 0,
        };
        assert_eq!(config.max_plaintext_len(), 1024 - 18 - 16);
    }
}
