use std::fmt;

use flowersec_wire::FrameError;

/// Errors from the mux frame layer and session/stream state machines.
#[derive(Debug)]
pub enum MuxError {
    /// A frame declared a `version` other than the one this session speaks.
    UnsupportedVersion(u8),
    /// A frame declared a `type` byte outside DATA/WINDOW_UPDATE/PING/GO_AWAY.
    UnknownFrameType(u8),
    /// A non-SYN frame referenced a stream ID the session has never seen.
    UnknownStream(u32),
    /// The session has already used every stream ID of its parity.
    StreamIdsExhausted,
    /// DATA arrived that would overrun the receiver's advertised window.
    RecvWindowExceeded { stream_id: u32 },
    /// The peer reset the stream; pending reads/writes should fail.
    StreamReset(u32),
    /// The local or peer side already closed the stream for writes.
    StreamClosed(u32),
    /// The peer sent GO_AWAY; the whole session is being torn down.
    SessionGoingAway,
    /// The session's reader loop ended (transport EOF or fatal error).
    SessionClosed,
    Frame(FrameError),
    Io(std::io::Error),
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::UnsupportedVersion(v) => write!(f, "unsupported mux protocol version: {v}"),
            MuxError::UnknownFrameType(t) => write!(f, "unknown mux frame type: {t}"),
            MuxError::UnknownStream(id) => write!(f, "frame referenced unknown stream id {id}"),
            MuxError::StreamIdsExhausted => write!(f, "no stream ids of this parity remain"),
            MuxError::RecvWindowExceeded { stream_id } => {
                write!(f, "stream {stream_id} receive window exceeded")
            }
            MuxError::StreamReset(id) => write!(f, "stream {id} was reset"),
            MuxError::StreamClosed(id) => write!(f, "stream {id} is closed"),
            MuxError::SessionGoingAway => write!(f, "mux session received GO_AWAY"),
            MuxError::SessionClosed => write!(f, "mux session is closed"),
            MuxError::Frame(e) => write!(f, "frame error: {e}"),
            MuxError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for MuxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MuxError::Frame(e) => Some(e),
            MuxError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for MuxError {
    fn from(e: FrameError) -> Self {
        MuxError::Frame(e)
    }
}

impl From<std::io::Error> for MuxError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            MuxError::SessionClosed
        } else {
            MuxError::Io(e)
        }
    }
}
