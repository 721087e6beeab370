//! Handshake transcript hash: binds suite, role, channel, both nonces and
//! both ephemeral public keys so neither peer can be fooled into deriving
//! session keys for a different handshake.

use sha2::{Digest, Sha256};

/// Which end of the handshake this peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client = 0,
    Server = 1,
}

/// Every field that goes into the transcript hash, in wire order.
pub struct TranscriptInput<'a> {
    pub version: u8,
    pub suite: u16,
    pub role: Role,
    pub client_features: u32,
    pub server_features: u32,
    pub channel_id: &'a [u8],
    pub nonce_c: &'a [u8; 32],
    pub nonce_s: &'a [u8; 32],
    pub client_eph: &'a [u8],
    pub server_eph: &'a [u8],
}

/// Compute the domain-separated SHA-256 transcript hash.
pub fn transcript_hash(input: &TranscriptInput<'_>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"flowersec-e2ee-v1");
    hasher.update([input.version]);
    hasher.update(input.suite.to_be_bytes());
    hasher.update([input.role as u8]);
    hasher.update(input.client_features.to_be_bytes());
    hasher.update(input.server_features.to_be_bytes());
    hasher.update((input.channel_id.len() as u16).to_be_bytes());
    hasher.update(input.channel_id);
    hasher.update(input.nonce_c);
    hasher.update(input.nonce_s);
    hasher.update((input.client_eph.len() as u16).to_be_bytes());
    hasher.update(input.client_eph);
    hasher.update((input.server_eph.len() as u16).to_be_bytes());
    hasher.update(input.server_eph);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input<'a>(channel_id: &'a [u8], nonce_c: &'a [u8; 32], nonce_s: &'a [u8; 32], client_eph: &'a [u8], server_eph: &'a [u8]) -> TranscriptInput<'a> {
        TranscriptInput {
            version: 1,
            suite: 1,
            role: Role::Client,
            client_features: 0,
            server_features: 0,
            channel_id,
            nonce_c,
            nonce_s,
            client_eph,
            server_eph,
        }
    }

    #[test]
    fn deterministic_for_fixed_input() {
        let channel_id = b"chan-1";
        let nonce_c = [1u8; 32];
        let nonce_s = [2u8; 32];
        let client_eph = [3u8; 32];
        let server_eph = [4u8; 32];

        let a = transcript_hash(&sample_input(channel_id, &nonce_c, &nonce_s, &client_eph, &server_eph));
        let b = transcript_hash(&sample_input(channel_id, &nonce_c, &nonce_s, &client_eph, &server_eph));
        assert_eq!(a, b);
    }

    #[test]
    fn role_is_domain_separated() {
        let channel_id = b"chan-1";
        let nonce_c = [1u8; 32];
        let nonce_s = [2u8; 32];
        let client_eph = [3u8; 32];
        let server_eph = [4u8; 32];

        let mut client_view = sample_input(channel_id, &nonce_c, &nonce_s, &client_eph, &server_eph);
        let server_view_input = TranscriptInput {
            role: Role::Server,
            ..sample_input(channel_id, &nonce_c, &nonce_s, &client_eph, &server_eph)
        };
        client_view.role = Role::Client;

        assert_ne!(transcript_hash(&client_view), transcript_hash(&server_view_input));
    }

    #[test]
    fn differing_channel_id_changes_hash() {
        let nonce_c = [1u8; 32];
        let nonce_s = [2u8; 32];
        let client_eph = [3u8; 32];
        let server_eph = [4u8; 32];

        let a = transcript_hash(&sample_input(b"chan-a", &nonce_c, &nonce_s, &client_eph, &server_eph));
        let b = transcript_hash(&sample_input(b"chan-b", &nonce_c, &nonce_s, &client_eph, &server_eph));
        assert_ne!(a, b);
    }
}
