//! The `channel_id -> Channel` pairing map: each channel has a client
//! slot and a server slot, filled independently by two separate Attach
//! requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::endpoint::Endpoint;
use crate::token::TokenClaims;
use flowersec_grant::GrantRole;

/// The channel-wide facts both slot holders' tokens must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelTerms {
    channel_init_expire_at_unix_s: i64,
    idle_timeout_seconds: i32,
}

struct Slot {
    endpoint: Arc<Endpoint>,
    attached_at: Instant,
}

#[derive(Default)]
struct Channel {
    terms: Option<ChannelTerms>,
    client: Option<Slot>,
    server: Option<Slot>,
}

/// Why an attach attempt into a channel slot was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachRejection {
    /// This channel already has a live holder for the role and the grace
    /// window hasn't allowed a replacement.
    ReplaceRateLimited,
    /// This attach's claims disagree with the channel's already-recorded
    /// init-expiry.
    InitExpMismatch,
    /// This attach's claims disagree with the channel's already-recorded
    /// idle timeout.
    IdleTimeoutMismatch,
}

/// The outcome of a successful attach: whether the opposite slot is
/// already filled (forwarding can start) or this endpoint is waiting.
pub enum AttachOutcome {
    Paired { peer: Arc<Endpoint> },
    Waiting,
}

/// `channel_id -> Channel`, guarded by one lock. Channels are small and
/// attach/detach are infrequent relative to forwarded traffic, so a
/// single `Mutex` over the whole map is simpler than per-channel locks
/// and never held across an `.await`.
#[derive(Default)]
pub struct ChannelMap {
    channels: Mutex<HashMap<String, Channel>>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to place `endpoint` into `role`'s slot on `channel_id`.
    pub fn attach(
        &self,
        channel_id: &str,
        role: GrantRole,
        claims: &TokenClaims,
        endpoint: Arc<Endpoint>,
        replace_grace: Duration,
    ) -> Result<AttachOutcome, AttachRejection> {
        let mut channels = self.channels.lock();
        let channel = channels.entry(channel_id.to_string()).or_default();

        let terms = ChannelTerms {
            channel_init_expire_at_unix_s: claims.channel_init_expire_at_unix_s,
            idle_timeout_seconds: claims.idle_timeout_seconds,
        };
        match channel.terms {
            None => channel.terms = Some(terms),
            Some(existing) => {
                if existing.channel_init_expire_at_unix_s != terms.channel_init_expire_at_unix_s {
                    return Err(AttachRejection::InitExpMismatch);
                }
                if existing.idle_timeout_seconds != terms.idle_timeout_seconds {
                    return Err(AttachRejection::IdleTimeoutMismatch);
                }
            }
        }

        let slot = match role {
            GrantRole::Client => &mut channel.client,
            GrantRole::Server => &mut channel.server,
        };

        if let Some(existing) = slot {
            let still_in_grace = existing.attached_at.elapsed() < replace_grace;
            if !existing.endpoint.is_closed() && still_in_grace {
                return Err(AttachRejection::ReplaceRateLimited);
            }
            existing.endpoint.shut_down();
        }

        *slot = Some(Slot { endpoint: endpoint.clone(), attached_at: Instant::now() });

        let peer_slot = match role {
            GrantRole::Client => &channel.server,
            GrantRole::Server => &channel.client,
        };

        match peer_slot {
            Some(peer) if !peer.endpoint.is_closed() => {
                Ok(AttachOutcome::Paired { peer: peer.endpoint.clone() })
            }
            _ => Ok(AttachOutcome::Waiting),
        }
    }

    /// Remove `channel_id` entirely once both endpoints have disconnected
    /// and no replacement arrived; called by the forwarder on teardown.
    pub fn remove_if_both_closed(&self, channel_id: &str) {
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get(channel_id) {
            let client_closed = channel.client.as_ref().is_none_or(|s| s.endpoint.is_closed());
            let server_closed = channel.server.as_ref().is_none_or(|s| s.endpoint.is_closed());
            if client_closed && server_closed {
                channels.remove(channel_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::mock;
    use tokio::sync::Semaphore;

    fn claims(channel_id: &str, role: u8) -> TokenClaims {
        TokenClaims {
            aud: "flowersec-tunnel".to_string(),
            iss: "controlplane".to_string(),
            exp: 2_000_000_000,
            channel_id: channel_id.to_string(),
            role,
            kid: "k1".to_string(),
            channel_init_expire_at_unix_s: 1_000,
            idle_timeout_seconds: 60,
        }
    }

    fn writer() -> Arc<Endpoint> {
        let (_near, far) = mock::pair();
        let budget = Arc::new(Semaphore::new(4096));
        Endpoint::spawn(Box::new(far), 4096, budget, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn first_attach_waits_for_its_peer() {
        let map = ChannelMap::new();
        let outcome = map
            .attach("chan-1", GrantRole::Client, &claims("chan-1", 1), writer(), Duration::from_secs(2))
            .unwrap();
        assert!(matches!(outcome, AttachOutcome::Waiting));
    }

    #[tokio::test]
    async fn second_attach_on_the_other_role_pairs() {
        let map = ChannelMap::new();
        map.attach("chan-1", GrantRole::Client, &claims("chan-1", 1), writer(), Duration::from_secs(2)).unwrap();
        let outcome = map
            .attach("chan-1", GrantRole::Server, &claims("chan-1", 2), writer(), Duration::from_secs(2))
            .unwrap();
        assert!(matches!(outcome, AttachOutcome::Paired { .. }));
    }

    #[tokio::test]
    async fn occupied_live_slot_rejects_replacement_within_grace() {
        let map = ChannelMap::new();
        map.attach("chan-1", GrantRole::Client, &claims("chan-1", 1), writer(), Duration::from_secs(2)).unwrap();
        let result = map.attach("chan-1", GrantRole::Client, &claims("chan-1", 1), writer(), Duration::from_secs(2));
        assert_eq!(result, Err(AttachRejection::ReplaceRateLimited));
    }

    #[tokio::test]
    async fn mismatched_init_expiry_is_rejected() {
        let map = ChannelMap::new();
        map.attach("chan-1", GrantRole::Client, &claims("chan-1", 1), writer(), Duration::from_secs(2)).unwrap();
        let mut other = claims("chan-1", 2);
        other.channel_init_expire_at_unix_s = 9_999;
        let result = map.attach("chan-1", GrantRole::Server, &other, writer(), Duration::from_secs(2));
        assert_eq!(result, Err(AttachRejection::InitExpMismatch));
    }

    #[tokio::test]
    async fn mismatched_idle_timeout_is_rejected() {
        let map = ChannelMap::new();
        map.attach("chan-1", GrantRole::Client, &claims("chan-1", 1), writer(), Duration::from_secs(2)).unwrap();
        let mut other = claims("chan-1", 2);
        other.idle_timeout_seconds = 9999;
        let result = map.attach("chan-1", GrantRole::Server, &other, writer(), Duration::from_secs(2));
        assert_eq!(result, Err(AttachRejection::IdleTimeoutMismatch));
    }
}
