//! WebSocket rendezvous tunnel: Origin-gated upgrade, signed single-use
//! attach tokens, channel pairing, and a binary-frame forwarder between
//! the two paired endpoints.

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod origin;
pub mod server;
pub mod token;

pub use config::TunnelConfig;
pub use error::{CloseReason, TunnelError};
pub use origin::OriginAllowList;
pub use server::{router, TunnelState};
pub use token::{Keyset, TokenClaims, TokenError};
