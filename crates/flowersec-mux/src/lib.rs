//! Yamux-style stream multiplexer (protocol version 0) over a single byte
//! duplex. Knows nothing about E2EE or RPC — it runs
//! over any `AsyncRead + AsyncWrite` transport, which in the flowersec
//! stack is a `SecureChannel`.

pub mod config;
pub mod error;
pub mod frame;
mod session;
mod stream;

pub use config::MuxConfig;
pub use error::MuxError;
pub use session::{MuxRole, MuxSession};
pub use stream::Stream;
