use std::fmt;

/// The fixed vocabulary of reasons a tunnel connection gets closed before
/// (or instead of) forwarding starts. Surfaced as a WebSocket close frame
/// with code 1008 (Policy Violation) and this token as the close reason
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    InvalidToken,
    InitExpMismatch,
    IdleTimeoutMismatch,
    ChannelMismatch,
    TokenReplay,
    TooManyConnections,
    ReplaceRateLimited,
}

impl CloseReason {
    pub const POLICY_VIOLATION: u16 = 1008;

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::InvalidToken => "invalid_token",
            CloseReason::InitExpMismatch => "init_exp_mismatch",
            CloseReason::IdleTimeoutMismatch => "idle_timeout_mismatch",
            CloseReason::ChannelMismatch => "channel_mismatch",
            CloseReason::TokenReplay => "token_replay",
            CloseReason::TooManyConnections => "too_many_connections",
            CloseReason::ReplaceRateLimited => "replace_rate_limited",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the tunnel's own logic (as opposed to a rejected attach,
/// which is reported as a [`CloseReason`] close frame rather than this
/// type).
#[derive(Debug)]
pub enum TunnelError {
    Closed(CloseReason),
    Io(std::io::Error),
    WriteTimedOut,
    ProtocolViolation(&'static str),
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::Closed(reason) => write!(f, "connection closed: {reason}"),
            TunnelError::Io(e) => write!(f, "io error: {e}"),
            TunnelError::WriteTimedOut => write!(f, "write did not complete before the deadline"),
            TunnelError::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
        }
    }
}

impl std::error::Error for TunnelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TunnelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TunnelError {
    fn from(e: std::io::Error) -> Self {
        TunnelError::Io(e)
    }
}
