use std::time::Duration;

/// Tunable parameters for a tunnel server. Constructed explicitly by the
/// caller and handed to [`crate::server::TunnelState::new`] — no global
/// singleton.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Maximum number of simultaneously attached connections across every
    /// channel.
    pub max_connections: usize,
    /// How long a slot holder has to be replaced by a new attach once its
    /// connection is no longer live. While live, a slot never yields to a
    /// replacement attach regardless of this window.
    pub replace_grace: Duration,
    /// Bound on bytes queued on one connection's outbound write channel
    /// before the connection is closed for being too slow.
    pub per_connection_write_queue_bytes: usize,
    /// Deadline for one queued frame to actually reach the socket.
    pub write_timeout: Duration,
    /// Deadline for the first (Attach) message to arrive after upgrade.
    pub attach_timeout: Duration,
    /// Session-wide cap on bytes queued for write across every connection,
    /// enforced for backpressure fairness between channels.
    pub max_total_pending_bytes: usize,
    /// If set, the token's `aud` claim must equal this value.
    pub expected_aud: Option<String>,
    /// If set, the token's `iss` claim must equal this value.
    pub expected_iss: Option<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            replace_grace: Duration::from_secs(2),
            per_connection_write_queue_bytes: 4 * 1024 * 1024,
            write_timeout: Duration::from_secs(10),
            attach_timeout: Duration::from_secs(10),
            max_total_pending_bytes: 256 * 1024 * 1024,
            expected_aud: None,
            expected_iss: None,
        }
    }
}
