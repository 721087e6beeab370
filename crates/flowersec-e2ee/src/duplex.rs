//! Bridges [`SecureChannel`]'s async `read`/`write` to `AsyncRead`/
//! `AsyncWrite`, so a yamux session can run directly over an E2EE channel
//! the same way it runs over any other duplex.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::E2eeError;
use crate::secure_channel::SecureChannel;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// `AsyncRead + AsyncWrite` view of a [`SecureChannel`]. Each `poll_write`
/// enqueues at most one record's worth of plaintext; a closed channel
/// surfaces as a clean EOF on the read side, matching the underlying
/// channel's "closed" state rather than the original I/O error that
/// tripped it.
pub struct SecureChannelDuplex {
    channel: SecureChannel,
    max_plaintext_len: usize,
    read_buf: Vec<u8>,
    read_pos: usize,
    pending_read: Option<BoxFuture<Result<Vec<u8>, E2eeError>>>,
    pending_write: Option<BoxFuture<Result<(), E2eeError>>>,
    pending_write_len: usize,
}

impl SecureChannelDuplex {
    pub fn new(channel: SecureChannel, max_plaintext_len: usize) -> Self {
        Self {
            channel,
            max_plaintext_len,
            read_buf: Vec::new(),
            read_pos: 0,
            pending_read: None,
            pending_write: None,
            pending_write_len: 0,
        }
    }
}

impl AsyncRead for SecureChannelDuplex {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            if self.read_pos < self.read_buf.len() {
                let available = &self.read_buf[self.read_pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                self.read_pos += n;
                return Poll::Ready(Ok(()));
            }

            if self.pending_read.is_none() {
                let channel = self.channel.clone();
                self.pending_read = Some(Box::pin(async move { channel.read().await }));
            }

            let fut = self.pending_read.as_mut().expect("just populated above");
            match fut.as_mut().poll(cx) {
                Poll::Ready(Ok(bytes)) => {
                    self.pending_read = None;
                    self.read_buf = bytes;
                    self.read_pos = 0;
                    if self.read_buf.is_empty() {
                        continue;
                    }
                }
                Poll::Ready(Err(_)) => {
                    self.pending_read = None;
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for SecureChannelDuplex {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.pending_write.is_none() {
            let channel = self.channel.clone();
            let max_plaintext_len = self.max_plaintext_len.max(1);
            let chunk_len = buf.len().min(max_plaintext_len);
            let owned = buf[..chunk_len].to_vec();
            self.pending_write_len = owned.len();
            self.pending_write = Some(Box::pin(async move { channel.write(&owned, max_plaintext_len).await }));
        }

        let fut = self.pending_write.as_mut().expect("just populated above");
        match fut.as_mut().poll(cx) {
            Poll::Ready(Ok(())) => {
                let n = self.pending_write_len;
                self.pending_write = None;
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => {
                self.pending_write = None;
                Poll::Ready(Err(io::Error::other(e.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
