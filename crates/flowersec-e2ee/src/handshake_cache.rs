//! Server-side cache keyed by the canonical-JSON fingerprint of an Init
//! message, so a duplicated Init (network retry, client timeout) gets the
//! same Resp instead of a fresh server ephemeral key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use flowersec_crypto::EphemeralPrivateKey;

use crate::error::E2eeError;
use crate::frame::RespPayload;

pub struct PendingHandshake {
    pub handshake_id: String,
    pub resp: RespPayload,
    pub channel_id: String,
    pub suite: u16,
    pub client_features: u32,
    pub nonce_c: [u8; 32],
    pub nonce_s: [u8; 32],
    pub client_eph: Vec<u8>,
    pub server_eph_pub: Vec<u8>,
    /// Taken (and consumed) the first time the Ack for this handshake arrives.
    pub server_eph_priv: Option<Box<dyn EphemeralPrivateKey>>,
    expires_at: Instant,
}

/// Bounded, TTL-expiring map of in-flight server handshakes.
pub struct HandshakeCache {
    entries: Mutex<HashMap<String, PendingHandshake>>,
    ttl: Duration,
    cap: usize,
}

impl HandshakeCache {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            cap,
        }
    }

    fn evict_expired_locked(entries: &mut HashMap<String, PendingHandshake>) {
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Look up an existing entry for `fingerprint`, returning its cached Resp
    /// for an idempotent Init retry.
    pub fn lookup_resp(&self, fingerprint: &str) -> Option<RespPayload> {
        let mut entries = self.entries.lock();
        Self::evict_expired_locked(&mut entries);
        entries.get(fingerprint).map(|entry| entry.resp.clone())
    }

    /// Insert a freshly-generated pending handshake, failing if the cache is
    /// at capacity and has no expired entries to reclaim.
    pub fn insert(&self, fingerprint: String, entry: PendingHandshake) -> Result<(), E2eeError> {
        let mut entries = self.entries.lock();
        Self::evict_expired_locked(&mut entries);
        if entries.len() >= self.cap && !entries.contains_key(&fingerprint) {
            return Err(E2eeError::TooManyPendingHandshakes);
        }
        entries.insert(fingerprint, entry);
        Ok(())
    }

    /// Take the entry matching `handshake_id`, removing it from the cache.
    /// Used when processing an Ack: the entry (and its private key) is
    /// single-use from this point on.
    pub fn take_by_handshake_id(&self, handshake_id: &str) -> Option<PendingHandshake> {
        let mut entries = self.entries.lock();
        Self::evict_expired_locked(&mut entries);
        let fingerprint = entries
            .iter()
            .find(|(_, entry)| entry.handshake_id == handshake_id)
            .map(|(fp, _)| fp.clone())?;
        entries.remove(&fingerprint)
    }

    fn expires_at(&self) -> Instant {
        Instant::now() + self.ttl
    }

    pub fn make_entry(
        &self,
        handshake_id: String,
        resp: RespPayload,
        channel_id: String,
        suite: u16,
        client_features: u32,
        nonce_c: [u8; 32],
        nonce_s: [u8; 32],
        client_eph: Vec<u8>,
        server_eph_pub: Vec<u8>,
        server_eph_priv: Box<dyn EphemeralPrivateKey>,
    ) -> PendingHandshake {
        PendingHandshake {
            handshake_id,
            resp,
            channel_id,
            suite,
            client_features,
            nonce_c,
            nonce_s,
            client_eph,
            server_eph_pub,
            server_eph_priv: Some(server_eph_priv),
            expires_at: self.expires_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowersec_crypto::{suite_for_id, SUITE_X25519_HKDF_SHA256_AES_256_GCM};

    fn sample_resp() -> RespPayload {
        RespPayload {
            handshake_id: "hs-1".to_string(),
            server_eph_pub_b64u: "pub".to_string(),
            nonce_s_b64u: "nonce".to_string(),
            server_features: 0,
        }
    }

    #[test]
    fn insert_and_lookup_round_trip() {
        let cache = HandshakeCache::new(Duration::from_secs(60), 10);
        let suite = suite_for_id(SUITE_X25519_HKDF_SHA256_AES_256_GCM).unwrap();
        let (priv_key, pub_key) = suite.generate_ephemeral();
        let entry = cache.make_entry(
            "hs-1".to_string(),
            sample_resp(),
            "chan".to_string(),
            1,
            0,
            [0u8; 32],
            [1u8; 32],
            vec![0u8; 32],
            pub_key,
            priv_key,
        );
        cache.insert("fp-1".to_string(), entry).unwrap();
        assert!(cache.lookup_resp("fp-1").is_some());
        assert!(cache.lookup_resp("fp-missing").is_none());
    }

    #[test]
    fn cache_rejects_beyond_capacity() {
        let cache = HandshakeCache::new(Duration::from_secs(60), 1);
        let suite = suite_for_id(SUITE_X25519_HKDF_SHA256_AES_256_GCM).unwrap();

        let (priv_a, pub_a) = suite.generate_ephemeral();
        let entry_a = cache.make_entry(
            "hs-a".to_string(),
            sample_resp(),
            "chan-a".to_string(),
            1,
            0,
            [0u8; 32],
            [1u8; 32],
            vec![0u8; 32],
            pub_a,
            priv_a,
        );
        cache.insert("fp-a".to_string(), entry_a).unwrap();

        let (priv_b, pub_b) = suite.generate_ephemeral();
        let entry_b = cache.make_entry(
            "hs-b".to_string(),
            sample_resp(),
            "chan-b".to_string(),
            1,
            0,
            [0u8; 32],
            [1u8; 32],
            vec![0u8; 32],
            pub_b,
            priv_b,
        );
        assert!(matches!(
            cache.insert("fp-b".to_string(), entry_b),
            Err(E2eeError::TooManyPendingHandshakes)
        ));
    }

    #[test]
    fn take_by_handshake_id_removes_entry() {
        let cache = HandshakeCache::new(Duration::from_secs(60), 10);
        let suite = suite_for_id(SUITE_X25519_HKDF_SHA256_AES_256_GCM).unwrap();
        let (priv_key, pub_key) = suite.generate_ephemeral();
        let entry = cache.make_entry(
            "hs-1".to_string(),
            sample_resp(),
            "chan".to_string(),
            1,
            0,
            [0u8; 32],
            [1u8; 32],
            vec![0u8; 32],
            pub_key,
            priv_key,
        );
        cache.insert("fp-1".to_string(), entry).unwrap();

        let taken = cache.take_by_handshake_id("hs-1");
        assert!(taken.is_some());
        assert!(cache.lookup_resp("fp-1").is_none());
        assert!(cache.take_by_handshake_id("hs-1").is_none());
    }
}
