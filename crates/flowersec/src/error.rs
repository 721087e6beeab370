//! The `{path, stage, code}` triple every connect/close failure surfaces,
//! with the original cause preserved via `source()`.

use std::fmt;

/// Which route a connect attempt took, or was told to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPath {
    Auto,
    Tunnel,
    Direct,
}

impl ConnectPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectPath::Auto => "auto",
            ConnectPath::Tunnel => "tunnel",
            ConnectPath::Direct => "direct",
        }
    }
}

impl fmt::Display for ConnectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phase of the connect sequence a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    Validate,
    Connect,
    Attach,
    Handshake,
    Secure,
    Yamux,
    Rpc,
    Close,
}

impl ConnectStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectStage::Validate => "validate",
            ConnectStage::Connect => "connect",
            ConnectStage::Attach => "attach",
            ConnectStage::Handshake => "handshake",
            ConnectStage::Secure => "secure",
            ConnectStage::Yamux => "yamux",
            ConnectStage::Rpc => "rpc",
            ConnectStage::Close => "close",
        }
    }
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed enumeration of machine-readable failure codes. Mirrors the
/// vocabulary lower layers already use for their own error variants and
/// the tunnel's close-reason tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectCode {
    MissingGrant,
    MissingOrigin,
    InvalidInput,
    InvalidPsk,
    InvalidSuite,
    InvalidEndpointInstanceId,
    EndpointInstanceIdNotAllowed,
    TimestampOutOfSkew,
    TimestampAfterInitExp,
    AuthTagMismatch,
    InvalidVersion,
    FrameTooLarge,
    RecordBadSeq,
    RecordBadFlag,
    RecordDecryptFailed,
    TooManyPendingHandshakes,
    MuxFailed,
    OpenStreamFailed,
    StreamHelloFailed,
    NotConnected,
    InvalidToken,
    InitExpMismatch,
    IdleTimeoutMismatch,
    ChannelMismatch,
    TokenReplay,
    TooManyConnections,
    ReplaceRateLimited,
    Timeout,
    Canceled,
}

impl ConnectCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectCode::MissingGrant => "missing_grant",
            ConnectCode::MissingOrigin => "missing_origin",
            ConnectCode::InvalidInput => "invalid_input",
            ConnectCode::InvalidPsk => "invalid_psk",
            ConnectCode::InvalidSuite => "invalid_suite",
            ConnectCode::InvalidEndpointInstanceId => "invalid_endpoint_instance_id",
            ConnectCode::EndpointInstanceIdNotAllowed => "endpoint_instance_id_not_allowed",
            ConnectCode::TimestampOutOfSkew => "timestamp_out_of_skew",
            ConnectCode::TimestampAfterInitExp => "timestamp_after_init_exp",
            ConnectCode::AuthTagMismatch => "auth_tag_mismatch",
            ConnectCode::InvalidVersion => "invalid_version",
            ConnectCode::FrameTooLarge => "frame_too_large",
            ConnectCode::RecordBadSeq => "record_bad_seq",
            ConnectCode::RecordBadFlag => "record_bad_flag",
            ConnectCode::RecordDecryptFailed => "record_decrypt_failed",
            ConnectCode::TooManyPendingHandshakes => "too_many_pending_handshakes",
            ConnectCode::MuxFailed => "mux_failed",
            ConnectCode::OpenStreamFailed => "open_stream_failed",
            ConnectCode::StreamHelloFailed => "stream_hello_failed",
            ConnectCode::NotConnected => "not_connected",
            ConnectCode::InvalidToken => "invalid_token",
            ConnectCode::InitExpMismatch => "init_exp_mismatch",
            ConnectCode::IdleTimeoutMismatch => "idle_timeout_mismatch",
            ConnectCode::ChannelMismatch => "channel_mismatch",
            ConnectCode::TokenReplay => "token_replay",
            ConnectCode::TooManyConnections => "too_many_connections",
            ConnectCode::ReplaceRateLimited => "replace_rate_limited",
            ConnectCode::Timeout => "timeout",
            ConnectCode::Canceled => "canceled",
        }
    }

    /// Map a tunnel close-reason token to its connect-level code. Returns
    /// `None` for a token this enumeration doesn't recognize (future tunnel
    /// versions may add reasons this client predates).
    pub fn from_close_reason_token(token: &str) -> Option<Self> {
        Some(match token {
            "invalid_token" => ConnectCode::InvalidToken,
            "init_exp_mismatch" => ConnectCode::InitExpMismatch,
            "idle_timeout_mismatch" => ConnectCode::IdleTimeoutMismatch,
            "channel_mismatch" => ConnectCode::ChannelMismatch,
            "token_replay" => ConnectCode::TokenReplay,
            "too_many_connections" => ConnectCode::TooManyConnections,
            "replace_rate_limited" => ConnectCode::ReplaceRateLimited,
            _ => return None,
        })
    }
}

impl fmt::Display for ConnectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connect or close failure, carrying the `{path, stage, code}` triple
/// plus the original cause, so callers get both a machine-readable
/// classification and a human-readable chain.
pub struct FlowersecError {
    pub path: ConnectPath,
    pub stage: ConnectStage,
    pub code: ConnectCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FlowersecError {
    pub fn new(path: ConnectPath, stage: ConnectStage, code: ConnectCode, message: impl Into<String>) -> Self {
        Self { path, stage, code, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Debug for FlowersecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowersecError")
            .field("path", &self.path)
            .field("stage", &self.stage)
            .field("code", &self.code)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for FlowersecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[path={}, stage={}, code={}] {}", self.path, self.stage, self.code, self.message)
    }
}

impl std::error::Error for FlowersecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_triple() {
        let err = FlowersecError::new(ConnectPath::Tunnel, ConnectStage::Attach, ConnectCode::TokenReplay, "token already spent");
        let text = err.to_string();
        assert!(text.contains("path=tunnel"));
        assert!(text.contains("stage=attach"));
        assert!(text.contains("code=token_replay"));
    }

    #[test]
    fn close_reason_tokens_map_to_codes() {
        assert_eq!(ConnectCode::from_close_reason_token("token_replay"), Some(ConnectCode::TokenReplay));
        assert_eq!(ConnectCode::from_close_reason_token("idle_timeout_mismatch"), Some(ConnectCode::IdleTimeoutMismatch));
        assert_eq!(ConnectCode::from_close_reason_token("not_a_real_reason"), None);
    }

    #[test]
    fn source_chain_is_preserved() {
        let io_err = std::io::Error::other("boom");
        let err = FlowersecError::new(ConnectPath::Direct, ConnectStage::Connect, ConnectCode::Timeout, "dial failed")
            .with_source(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
