//! Per-stream state: flow-control windows, the FIN/RST state machine, and
//! the `AsyncRead`/`AsyncWrite` byte-pipe surface applications see.
//!
//! `StreamShared` holds only a `Weak` back-reference to the owning
//! session: destroying the session invalidates all streams rather than
//! keeping them alive via a strong reference cycle.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;

use crate::frame::{flags, FrameHeader, FrameType};
use crate::session::{SessionInner, WriteCmd};

/// Largest payload carried by a single outbound DATA frame. Caps how much
/// of the send window one `poll_write` call consumes at once; writers
/// larger than this are simply called again by their `AsyncWrite` driver.
const MAX_STREAM_FRAME_BYTES: usize = 16 * 1024;

pub(crate) struct StreamState {
    pub(crate) local_closed: bool,
    pub(crate) remote_closed: bool,
    pub(crate) reset: bool,
    pub(crate) established: bool,
    pub(crate) recv_window: u32,
    pub(crate) send_window: i64,
    pub(crate) inbound: VecDeque<u8>,
    pub(crate) read_waker: Option<Waker>,
    pub(crate) write_waker: Option<Waker>,
    pub(crate) ack_tx: Option<oneshot::Sender<()>>,
}

pub(crate) struct StreamShared {
    pub(crate) id: u32,
    initial_window: u32,
    session: Weak<SessionInner>,
    pub(crate) state: Mutex<StreamState>,
}

impl StreamShared {
    pub(crate) fn new(id: u32, initial_window: u32, session: Weak<SessionInner>) -> Arc<Self> {
        Arc::new(Self {
            id,
            initial_window,
            session,
            state: Mutex::new(StreamState {
                local_closed: false,
                remote_closed: false,
                reset: false,
                established: false,
                recv_window: initial_window,
                send_window: initial_window as i64,
                inbound: VecDeque::new(),
                read_waker: None,
                write_waker: None,
                ack_tx: None,
            }),
        })
    }

    pub(crate) fn send(&self, header: FrameHeader, body: Vec<u8>) {
        if let Some(session) = self.session.upgrade() {
            let _ = session.write_tx.send(WriteCmd::Frame(header, body));
        }
    }

    fn session_alive(&self) -> bool {
        self.session.strong_count() > 0
    }

    /// Called after a reader has consumed `consumed` bytes out of `inbound`.
    /// Once the remaining window has fallen under half its max, grant the
    /// peer a replenishment delta back up to the max.
    fn maybe_replenish_window(&self) {
        let (delta, stream_id) = {
            let mut state = self.state.lock();
            if state.reset || state.remote_closed {
                return;
            }
            let half = self.initial_window / 2;
            if state.recv_window >= half {
                return;
            }
            let delta = self.initial_window - state.recv_window;
            state.recv_window += delta;
            (delta, self.id)
        };
        if delta > 0 {
            self.send(
                FrameHeader {
                    frame_type: FrameType::WindowUpdate,
                    flags: 0,
                    stream_id,
                    length: delta,
                },
                Vec::new(),
            );
        }
    }

    pub(crate) fn on_data(&self, data: Vec<u8>) -> Result<(), ()> {
        let mut state = self.state.lock();
        if data.len() as u32 > state.recv_window {
            return Err(());
        }
        state.recv_window -= data.len() as u32;
        state.inbound.extend(data);
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
        Ok(())
    }

    pub(crate) fn on_window_update(&self, delta: u32, is_ack: bool) {
        let mut state = self.state.lock();
        state.send_window = state.send_window.saturating_add(delta as i64);
        if is_ack {
            state.established = true;
            if let Some(tx) = state.ack_tx.take() {
                let _ = tx.send(());
            }
        }
        if let Some(waker) = state.write_waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn on_fin(&self) {
        let mut state = self.state.lock();
        state.remote_closed = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn on_reset(&self) {
        let mut state = self.state.lock();
        state.reset = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
        if let Some(waker) = state.write_waker.take() {
            waker.wake();
        }
        if let Some(tx) = state.ack_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A logical, flow-controlled byte stream multiplexed over a `MuxSession`.
///
/// Implements `AsyncRead`/`AsyncWrite` so callers (the RPC layer's
/// `StreamHello` preface and envelope framing) can drive it with the same
/// `flowersec_wire` helpers used on a raw transport.
pub struct Stream {
    pub(crate) shared: Arc<StreamShared>,
}

impl Stream {
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// True once the open handshake (SYN → ACK) has completed on either side.
    pub fn is_established(&self) -> bool {
        self.shared.state.lock().established
    }

    /// Abort the stream immediately; the peer sees this as an RST and any
    /// blocked reader/writer on either side observes an error.
    pub async fn reset(&self) {
        self.shared.on_reset();
        self.shared.send(
            FrameHeader {
                frame_type: FrameType::WindowUpdate,
                flags: flags::RST,
                stream_id: self.shared.id,
                length: 0,
            },
            Vec::new(),
        );
    }
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let shared = self.shared.clone();
        let mut state = shared.state.lock();

        if !state.inbound.is_empty() {
            let n = buf.remaining().min(state.inbound.len());
            let chunk: Vec<u8> = state.inbound.drain(..n).collect();
            buf.put_slice(&chunk);
            drop(state);
            shared.maybe_replenish_window();
            return Poll::Ready(Ok(()));
        }

        if state.reset {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "mux stream reset")));
        }

        if state.remote_closed {
            return Poll::Ready(Ok(()));
        }

        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let shared = self.shared.clone();

        if !shared.session_alive() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "mux session closed")));
        }

        let mut state = shared.state.lock();
        if state.reset {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "mux stream reset")));
        }
        if state.local_closed {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "mux stream closed for writes")));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if state.send_window <= 0 {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let chunk_len = (state.send_window as usize).min(buf.len()).min(MAX_STREAM_FRAME_BYTES);
        state.send_window -= chunk_len as i64;
        drop(state);

        shared.send(
            FrameHeader {
                frame_type: FrameType::Data,
                flags: 0,
                stream_id: shared.id,
                length: chunk_len as u32,
            },
            buf[..chunk_len].to_vec(),
        );
        Poll::Ready(Ok(chunk_len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.shared.state.lock();
        if !state.local_closed {
            state.local_closed = true;
            drop(state);
            self.shared.send(
                FrameHeader {
                    frame_type: FrameType::WindowUpdate,
                    flags: flags::FIN,
                    stream_id: self.shared.id,
                    length: 0,
                },
                Vec::new(),
            );
        }
        Poll::Ready(Ok(()))
    }
}
