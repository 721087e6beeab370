//! The client-side connect orchestrator: dial a WebSocket, attach to a
//! tunnel channel (or connect directly), run the E2EE handshake, start the
//! yamux session, and open the `"rpc"` stream — all under one call, with
//! a `{path, stage, code}` error on any failure.
//!
//! Everything below this crate (wire framing, crypto, the handshake/record
//! layer, the mux, the RPC router, the tunnel server) is usable on its own;
//! this crate only wires them together for the client side of a connect.

pub mod config;
pub mod connect;
pub mod error;
mod keepalive;
pub mod target;
pub mod ws_stream;

pub use config::{ConnectOptions, KeepaliveMode};
pub use connect::{connect, FlowersecConnection};
pub use error::{ConnectCode, ConnectPath, ConnectStage, FlowersecError};
pub use target::ConnectTarget;
pub use ws_stream::{CloseCapture, WsByteStream};
