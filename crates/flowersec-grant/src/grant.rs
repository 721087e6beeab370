use facet::Facet;

use flowersec_wire::base64url;

use crate::error::GrantError;
use crate::role::GrantRole;

/// Controlplane-issued authorization to attach one endpoint to a tunnel
/// channel. Consumed exactly once per connect attempt.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct ChannelInitGrant {
    pub tunnel_url: String,
    pub channel_id: String,
    pub channel_init_expire_at_unix_s: i64,
    pub idle_timeout_seconds: i32,
    /// `1` = client, `2` = server. See [`GrantRole`].
    pub role: u8,
    pub token: String,
    pub e2ee_psk_b64u: String,
    pub allowed_suites: Vec<u16>,
    pub default_suite: u16,
}

/// Same PSK/channel/init-expiry material as [`ChannelInitGrant`] but for a
/// direct-to-endpoint WebSocket connection: no tunnel URL, no token.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct DirectConnectInfo {
    pub ws_url: String,
    pub channel_id: String,
    pub channel_init_expire_at_unix_s: i64,
    pub e2ee_psk_b64u: String,
    pub default_suite: u16,
}

impl ChannelInitGrant {
    pub fn role(&self) -> Result<GrantRole, GrantError> {
        GrantRole::from_wire(self.role)
    }

    /// Decode `e2ee_psk_b64u`, requiring exactly 32 bytes.
    pub fn psk(&self) -> Result<[u8; 32], GrantError> {
        decode_psk(&self.e2ee_psk_b64u)
    }

    /// Validate the fields the connect orchestrator checks before dialing:
    /// PSK length, suite support, and that `default_suite` is actually one
    /// of `allowed_suites`.
    pub fn validate(&self) -> Result<(), GrantError> {
        if self.channel_id.is_empty() {
            return Err(GrantError::MissingField("channel_id"));
        }
        if self.tunnel_url.is_empty() {
            return Err(GrantError::MissingField("tunnel_url"));
        }
        if self.token.is_empty() {
            return Err(GrantError::MissingField("token"));
        }
        self.role()?;
        self.psk()?;
        flowersec_crypto::suite_for_id(self.default_suite)
            .map_err(|_| GrantError::UnsupportedSuite(self.default_suite))?;
        if !self.allowed_suites.contains(&self.default_suite) {
            return Err(GrantError::UnsupportedSuite(self.default_suite));
        }
        Ok(())
    }
}

impl DirectConnectInfo {
    pub fn psk(&self) -> Result<[u8; 32], GrantError> {
        decode_psk(&self.e2ee_psk_b64u)
    }

    pub fn validate(&self) -> Result<(), GrantError> {
        if self.channel_id.is_empty() {
            return Err(GrantError::MissingField("channel_id"));
        }
        if self.ws_url.is_empty() {
            return Err(GrantError::MissingField("ws_url"));
        }
        self.psk()?;
        flowersec_crypto::suite_for_id(self.default_suite)
            .map_err(|_| GrantError::UnsupportedSuite(self.default_suite))?;
        Ok(())
    }
}

fn decode_psk(encoded: &str) -> Result<[u8; 32], GrantError> {
    let bytes = base64url::decode(encoded).map_err(|_| GrantError::InvalidPsk)?;
    bytes.try_into().map_err(|_| GrantError::InvalidPsk)
}

/// Validate a decoded `endpoint_instance_id` per the tunnel attach rule:
/// 16-32 bytes, tunnel attaches only.
pub fn validate_endpoint_instance_id(decoded: &[u8]) -> Result<(), GrantError> {
    if (16..=32).contains(&decoded.len()) {
        Ok(())
    } else {
        Err(GrantError::InvalidEndpointInstanceId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grant() -> ChannelInitGrant {
        ChannelInitGrant {
            tunnel_url: "wss://tunnel.example.com/attach".to_string(),
            channel_id: "chan-1".to_string(),
            channel_init_expire_at_unix_s: 2_000_000_000,
            idle_timeout_seconds: 60,
            role: 1,
            token: "signed-token".to_string(),
            e2ee_psk_b64u: base64url::encode(&[9u8; 32]),
            allowed_suites: vec![1, 2],
            default_suite: 1,
        }
    }

    #[test]
    fn valid_grant_passes_validation() {
        assert!(sample_grant().validate().is_ok());
    }

    #[test]
    fn short_psk_is_rejected() {
        let mut grant = sample_grant();
        grant.e2ee_psk_b64u = base64url::encode(&[1u8; 16]);
        assert!(matches!(grant.validate(), Err(GrantError::InvalidPsk)));
    }

    #[test]
    fn default_suite_not_in_allowed_list_is_rejected() {
        let mut grant = sample_grant();
        grant.default_suite = 99;
        assert!(matches!(grant.validate(), Err(GrantError::UnsupportedSuite(99))));
    }

    #[test]
    fn default_suite_not_implemented_by_any_suite_is_rejected() {
        // Unlike the case above, 7 is listed in `allowed_suites`, so only
        // the "is this suite id actually implemented" check can catch it.
        let mut grant = sample_grant();
        grant.allowed_suites = vec![7];
        grant.default_suite = 7;
        assert!(matches!(grant.validate(), Err(GrantError::UnsupportedSuite(7))));
    }

    #[test]
    fn empty_channel_id_is_rejected() {
        let mut grant = sample_grant();
        grant.channel_id.clear();
        assert!(matches!(grant.validate(), Err(GrantError::MissingField("channel_id"))));
    }

    #[test]
    fn endpoint_instance_id_length_is_enforced() {
        assert!(validate_endpoint_instance_id(&[0u8; 16]).is_ok());
        assert!(validate_endpoint_instance_id(&[0u8; 32]).is_ok());
        assert!(validate_endpoint_instance_id(&[0u8; 15]).is_err());
        assert!(validate_endpoint_instance_id(&[0u8; 33]).is_err());
    }

    #[test]
    fn direct_connect_info_validates() {
        let info = DirectConnectInfo {
            ws_url: "wss://endpoint.example.com/ws".to_string(),
            channel_id: "chan-2".to_string(),
            channel_init_expire_at_unix_s: 2_000_000_000,
            e2ee_psk_b64u: base64url::encode(&[3u8; 32]),
            default_suite: 1,
        };
        assert!(info.validate().is_ok());
    }

    #[test]
    fn direct_connect_info_rejects_an_unimplemented_suite() {
        let info = DirectConnectInfo {
            ws_url: "wss://endpoint.example.com/ws".to_string(),
            channel_id: "chan-2".to_string(),
            channel_init_expire_at_unix_s: 2_000_000_000,
            e2ee_psk_b64u: base64url::encode(&[3u8; 32]),
            default_suite: 7,
        };
        assert!(matches!(info.validate(), Err(GrantError::UnsupportedSuite(7))));
    }
}
