use facet::Facet;

/// The text frame a client sends as the first WebSocket message on a
/// tunnel attach: `{v:1, channel_id, role, token, endpoint_instance_id}`.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct AttachMessage {
    pub v: u32,
    pub channel_id: String,
    /// `1` = client, `2` = server. See [`crate::GrantRole`].
    pub role: u8,
    pub token: String,
    pub endpoint_instance_id: String,
}

impl AttachMessage {
    pub const PROTOCOL_VERSION: u32 = 1;

    pub fn new(channel_id: String, role: u8, token: String, endpoint_instance_id: String) -> Self {
        Self {
            v: Self::PROTOCOL_VERSION,
            channel_id,
            role,
            token,
            endpoint_instance_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_and_parses_round_trip() {
        let msg = AttachMessage::new(
            "chan-1".to_string(),
            1,
            "tok".to_string(),
            "ei-0000000000000000".to_string(),
        );
        let json = facet_json::to_string(&msg).unwrap();
        let parsed: AttachMessage = facet_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
