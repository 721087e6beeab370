use std::fmt;

/// Errors produced while reading or writing length-prefixed JSON frames.
#[derive(Debug)]
pub enum FrameError {
    /// The frame's declared length exceeded the caller's configured cap.
    TooLarge { len: u32, max: u32 },
    /// The underlying transport returned an I/O error.
    Io(std::io::Error),
    /// The frame bytes were not valid UTF-8.
    InvalidUtf8(std::str::Utf8Error),
    /// The frame bytes did not parse as JSON, or did not match the expected shape.
    InvalidJson(String),
    /// The connection was closed cleanly before a frame could be read.
    Eof,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLarge { len, max } => {
                write!(f, "frame_too_large: {len} bytes exceeds cap of {max}")
            }
            FrameError::Io(e) => write!(f, "io error: {e}"),
            FrameError::InvalidUtf8(e) => write!(f, "invalid utf-8 in frame: {e}"),
            FrameError::InvalidJson(msg) => write!(f, "invalid json frame: {msg}"),
            FrameError::Eof => write!(f, "connection closed before frame was read"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            FrameError::InvalidUtf8(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Eof
        } else {
            FrameError::Io(e)
        }
    }
}
