use std::fmt;

use flowersec_wire::FrameError;

use crate::envelope::{EnvelopeError, RpcError};

/// Errors a caller of `RpcClient` can observe. Distinct from `RpcError`,
/// which is the wire-level `{code, message}` a remote handler returns
/// inside a response envelope.
#[derive(Debug)]
pub enum RouterError {
    /// The transport closed (or was never usable) while a call was pending.
    TransportClosed,
    /// The caller's deadline elapsed before a response arrived; no frame
    /// was sent for this and a late response, if one shows up, is dropped.
    Canceled,
    /// A request to an unregistered `type_id` (server-side convenience;
    /// normally surfaced to the caller as `Remote` instead).
    UnknownType(u32),
    /// The remote handler returned a structured error in the response.
    Remote(RpcError),
    /// A frame could not be parsed as a well-formed envelope.
    Envelope(EnvelopeError),
    /// Underlying frame I/O failed.
    Frame(FrameError),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::TransportClosed => write!(f, "transport_closed"),
            RouterError::Canceled => write!(f, "canceled"),
            RouterError::UnknownType(id) => write!(f, "unknown type_id: {id}"),
            RouterError::Remote(e) => write!(f, "remote error: {e}"),
            RouterError::Envelope(e) => write!(f, "malformed envelope: {e}"),
            RouterError::Frame(e) => write!(f, "frame error: {e}"),
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::Remote(e) => Some(e),
            RouterError::Envelope(e) => Some(e),
            RouterError::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnvelopeError> for RouterError {
    fn from(e: EnvelopeError) -> Self {
        RouterError::Envelope(e)
    }
}

impl From<FrameError> for RouterError {
    fn from(e: FrameError) -> Self {
        RouterError::Frame(e)
    }
}
