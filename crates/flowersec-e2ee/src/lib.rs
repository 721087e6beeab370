//! End-to-end encrypted handshake and record layer: a PSK-authenticated
//! ephemeral-key handshake (client/server state machines) producing a
//! [`SecureChannel`], the post-handshake AEAD byte pipe yamux runs over.
//!
//! Knows nothing about yamux or RPC — it exposes `AsyncRead + AsyncWrite`
//! semantics (via `write`/`read`) to whatever multiplexer sits on top.

pub mod client;
pub mod config;
pub mod duplex;
pub mod error;
pub mod frame;
pub mod handshake_cache;
pub mod outcome;
mod record_cipher;
pub mod secure_channel;
pub mod server;

pub use client::run_client_handshake;
pub use config::{HandshakeConfig, RecordConfig};
pub use duplex::SecureChannelDuplex;
pub use error::E2eeError;
pub use handshake_cache::HandshakeCache;
pub use outcome::HandshakeOutcome;
pub use secure_channel::SecureChannel;
pub use server::run_server_handshake;
