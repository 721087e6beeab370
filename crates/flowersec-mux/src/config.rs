/// Tunable parameters for a mux session. Constructed explicitly by the
/// caller and passed to `MuxSession::new`/`MuxSession::client`/`MuxSession::server` —
/// no global singleton.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Initial (and maximum) per-stream flow-control window, both directions.
    pub initial_window: u32,
    /// Bound on frames queued for a stream's outbound write half before the
    /// writer blocks on `sendWindow`.
    pub accept_backlog: usize,
}

impl MuxConfig {
    /// Each stream has a `recvWindow` and `sendWindow`, both initially
    /// 256 KiB.
    pub const DEFAULT_WINDOW: u32 = 256 * 1024;
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            initial_window: Self::DEFAULT_WINDOW,
            accept_backlog: 64,
        }
    }
}
