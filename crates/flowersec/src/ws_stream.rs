//! Bridges a `tokio-tungstenite` WebSocket (message-oriented) to
//! `AsyncRead + AsyncWrite` (byte-oriented), so the handshake and record
//! layers below can run over it without knowing about WebSocket framing.
//! Every message carries opaque binary payload; a text frame or a
//! higher-level close is treated as the end of the stream.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;

type Inner = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Shared slot the byte stream stashes a close frame's code/reason into, so
/// the connect orchestrator can classify a rejected attach after the read
/// side has already turned the close into a clean EOF.
#[derive(Clone, Default)]
pub struct CloseCapture(Arc<Mutex<Option<(u16, String)>>>);

impl CloseCapture {
    pub fn get(&self) -> Option<(u16, String)> {
        self.0.lock().clone()
    }
}

pub struct WsByteStream {
    ws: Inner,
    read_buf: Vec<u8>,
    read_pos: usize,
    close: CloseCapture,
}

impl WsByteStream {
    /// Wrap `ws`, returning the byte stream plus a handle that will hold the
    /// close frame's `(code, reason)` once one arrives on the read side.
    pub fn new(ws: Inner) -> (Self, CloseCapture) {
        let close = CloseCapture::default();
        (Self { ws, read_buf: Vec::new(), read_pos: 0, close: close.clone() }, close)
    }
}

fn other(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

impl AsyncRead for WsByteStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            if self.read_pos < self.read_buf.len() {
                let available = &self.read_buf[self.read_pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                self.read_pos += n;
                return Poll::Ready(Ok(()));
            }

            match Pin::new(&mut self.ws).poll_next(cx) {
                Poll::Ready(Some(Ok(Message::Binary(bytes)))) => {
                    self.read_buf = bytes.to_vec();
                    self.read_pos = 0;
                    if self.read_buf.is_empty() {
                        continue;
                    }
                }
                Poll::Ready(Some(Ok(Message::Text(_)))) => {
                    return Poll::Ready(Err(other("text frame on a binary-only websocket stream")));
                }
                Poll::Ready(Some(Ok(Message::Close(frame)))) => {
                    if let Some(frame) = frame {
                        *self.close.0.lock() = Some((u16::from(frame.code), frame.reason.to_string()));
                    }
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Ready(Some(Ok(_))) => continue,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(other(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for WsByteStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match Pin::new(&mut self.ws).poll_ready(cx) {
            Poll::Ready(Ok(())) => {
                let len = buf.len();
                match Pin::new(&mut self.ws).start_send(Message::Binary(buf.to_vec().into())) {
                    Ok(()) => Poll::Ready(Ok(len)),
                    Err(e) => Poll::Ready(Err(other(e))),
                }
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(other(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.ws).poll_flush(cx).map_err(other)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.ws).poll_close(cx).map_err(other)
    }
}
