//! JSON-RPC envelope router that runs over one yamux stream (the stream
//! whose `StreamHello.kind == "rpc"`). Knows nothing about the mux, the
//! handshake, or the tunnel below it — it only needs an
//! `AsyncRead + AsyncWrite` stream.

pub mod client;
pub mod envelope;
pub mod error;
pub mod server;
pub mod stream_hello;

pub use client::RpcClient;
pub use envelope::{Envelope, RpcError};
pub use error::RouterError;
pub use server::{BoxFuture, Handler, HandlerTable, RegisterError, RpcServer, UNKNOWN_TYPE_CODE};
pub use stream_hello::{read_stream_hello, write_stream_hello, StreamHello, MAX_STREAM_HELLO_BYTES, RPC_STREAM_KIND};
