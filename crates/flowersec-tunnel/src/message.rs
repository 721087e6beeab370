//! Transport-agnostic message shape and the trait the forwarder and
//! attach logic drive it through, so both can be exercised against an
//! in-memory mock without an axum server.

use std::future::Future;
use std::pin::Pin;

use axum::extract::ws::{CloseFrame, Message, WebSocket};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// One side of a WebSocket connection, abstracted over axum's concrete
/// `WebSocket` type so the pairing/forwarding logic can be driven by an
/// in-memory mock in tests.
pub trait WsTransport: Send {
    fn recv(&mut self) -> BoxFuture<'_, Option<TunnelMessage>>;
    fn send(&mut self, message: TunnelMessage) -> BoxFuture<'_, std::io::Result<()>>;
    fn close(&mut self, code: u16, reason: String) -> BoxFuture<'_, ()>;
}

/// Adapts an axum [`WebSocket`] to [`WsTransport`]. Pings/pongs are
/// handled transparently by axum and never surface here; any other
/// non-text/binary variant is treated as a closed connection.
pub struct AxumWsTransport {
    socket: WebSocket,
}

impl AxumWsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl WsTransport for AxumWsTransport {
    fn recv(&mut self) -> BoxFuture<'_, Option<TunnelMessage>> {
        Box::pin(async move {
            loop {
                match self.socket.recv().await {
                    Some(Ok(Message::Text(text))) => return Some(TunnelMessage::Text(text.to_string())),
                    Some(Ok(Message::Binary(bytes))) => return Some(TunnelMessage::Binary(bytes.to_vec())),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                }
            }
        })
    }

    fn send(&mut self, message: TunnelMessage) -> BoxFuture<'_, std::io::Result<()>> {
        Box::pin(async move {
            let wire = match message {
                TunnelMessage::Text(text) => Message::Text(text.into()),
                TunnelMessage::Binary(bytes) => Message::Binary(bytes.into()),
            };
            self.socket
                .send(wire)
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))
        })
    }

    fn close(&mut self, code: u16, reason: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self
                .socket
                .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                .await;
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use tokio::sync::mpsc;

    /// An in-memory [`WsTransport`] pair, so forwarder/attach tests don't
    /// need a live axum server.
    pub struct MockTransport {
        inbound: mpsc::UnboundedReceiver<TunnelMessage>,
        outbound: mpsc::UnboundedSender<TunnelMessage>,
        closed: Option<(u16, String)>,
    }

    pub fn pair() -> (MockTransport, MockTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            MockTransport { inbound: b_rx, outbound: a_tx, closed: None },
            MockTransport { inbound: a_rx, outbound: b_tx, closed: None },
        )
    }

    impl MockTransport {
        pub fn closed_reason(&self) -> Option<&(u16, String)> {
            self.closed.as_ref()
        }
    }

    impl WsTransport for MockTransport {
        fn recv(&mut self) -> BoxFuture<'_, Option<TunnelMessage>> {
            Box::pin(async move { self.inbound.recv().await })
        }

        fn send(&mut self, message: TunnelMessage) -> BoxFuture<'_, std::io::Result<()>> {
            Box::pin(async move {
                self.outbound
                    .send(message)
                    .map_err(|_| std::io::Error::other("mock transport closed"))
            })
        }

        fn close(&mut self, code: u16, reason: String) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.closed = Some((code, reason));
            })
        }
    }
}
