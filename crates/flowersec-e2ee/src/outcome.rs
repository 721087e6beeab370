use flowersec_crypto::SessionKeys;

/// Everything a completed handshake hands off to the record layer.
pub struct HandshakeOutcome {
    pub session_keys: SessionKeys,
    pub transcript_hash: [u8; 32],
    pub psk: [u8; 32],
    /// First sequence number this side will use when sending.
    pub next_send_seq: u64,
    /// First sequence number this side expects when receiving.
    pub next_recv_seq: u64,
    pub is_client: bool,
}
