//! `MuxSession`: the streams table, the single writer task that
//! serializes frame emission, and the reader loop that dispatches
//! incoming frames to streams or session-level control handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::MuxConfig;
use crate::error::MuxError;
use crate::frame::{flags, read_body, read_header, write_frame, FrameHeader, FrameType};
use crate::stream::{Stream, StreamShared};

/// Which parity of stream ID this side opens with: the mux-level client
/// role opens odd IDs, the mux-level server role opens even IDs
/// (independent of the E2EE client/server role).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxRole {
    Client,
    Server,
}

pub(crate) enum WriteCmd {
    Frame(FrameHeader, Vec<u8>),
}

pub(crate) struct SessionInner {
    role: MuxRole,
    next_id: AtomicU32,
    streams: SyncMutex<HashMap<u32, Arc<StreamShared>>>,
    pub(crate) write_tx: mpsc::UnboundedSender<WriteCmd>,
    accept_tx: mpsc::Sender<Stream>,
    config: MuxConfig,
    closed: AtomicBool,
}

impl SessionInner {
    fn allocate_id(&self) -> Result<u32, MuxError> {
        let id = self.next_id.fetch_add(2, Ordering::AcqRel);
        if id > u32::MAX - 4 {
            return Err(MuxError::StreamIdsExhausted);
        }
        Ok(id)
    }
}

fn terminate_all_streams(streams: &SyncMutex<HashMap<u32, Arc<StreamShared>>>) {
    let map = streams.lock();
    for shared in map.values() {
        shared.on_reset();
    }
}

/// A yamux v0 session running over any `AsyncRead + AsyncWrite` duplex —
/// in flowersec, a `SecureChannel`.
pub struct MuxSession {
    inner: Arc<SessionInner>,
    accept_rx: AsyncMutex<mpsc::Receiver<Stream>>,
    writer_handle: SyncMutex<Option<JoinHandle<()>>>,
    reader_handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl MuxSession {
    pub fn new_client<T>(transport: T, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(transport, MuxRole::Client, config)
    }

    pub fn new_server<T>(transport: T, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(transport, MuxRole::Server, config)
    }

    fn spawn<T>(transport: T, role: MuxRole, config: MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (accept_tx, accept_rx) = mpsc::channel(config.accept_backlog);

        let start_id = match role {
            MuxRole::Client => 1,
            MuxRole::Server => 2,
        };

        let inner = Arc::new(SessionInner {
            role,
            next_id: AtomicU32::new(start_id),
            streams: SyncMutex::new(HashMap::new()),
            write_tx,
            accept_tx,
            config,
            closed: AtomicBool::new(false),
        });

        let writer_handle = tokio::spawn(run_writer(write_half, write_rx));
        let reader_handle = tokio::spawn(run_reader(read_half, inner.clone()));

        Self {
            inner,
            accept_rx: AsyncMutex::new(accept_rx),
            writer_handle: SyncMutex::new(Some(writer_handle)),
            reader_handle: SyncMutex::new(Some(reader_handle)),
        }
    }

    /// Open a new stream: send `WINDOW_UPDATE` with `SYN` and wait for the
    /// peer's `WINDOW_UPDATE` + `ACK` before returning it to the caller.
    pub async fn open_stream(&self) -> Result<Stream, MuxError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(MuxError::SessionClosed);
        }

        let id = self.inner.allocate_id()?;
        let shared = StreamShared::new(id, self.inner.config.initial_window, Arc::downgrade(&self.inner));

        let (ack_tx, ack_rx) = oneshot::channel();
        shared.state.lock().ack_tx = Some(ack_tx);

        self.inner.streams.lock().insert(id, shared.clone());

        self.inner
            .write_tx
            .send(WriteCmd::Frame(
                FrameHeader {
                    frame_type: FrameType::WindowUpdate,
                    flags: flags::SYN,
                    stream_id: id,
                    length: 0,
                },
                Vec::new(),
            ))
            .map_err(|_| MuxError::SessionClosed)?;

        ack_rx.await.map_err(|_| MuxError::SessionClosed)?;

        if shared.state.lock().reset {
            return Err(MuxError::StreamReset(id));
        }

        Ok(Stream { shared })
    }

    /// Await the next peer-opened stream.
    pub async fn accept_stream(&self) -> Result<Stream, MuxError> {
        let mut rx = self.accept_rx.lock().await;
        rx.recv().await.ok_or(MuxError::SessionClosed)
    }

    /// Send a `PING` with `SYN`; does not wait for the peer's `ACK`.
    pub async fn ping(&self) -> Result<(), MuxError> {
        self.inner
            .write_tx
            .send(WriteCmd::Frame(
                FrameHeader {
                    frame_type: FrameType::Ping,
                    flags: flags::SYN,
                    stream_id: 0,
                    length: 0,
                },
                Vec::new(),
            ))
            .map_err(|_| MuxError::SessionClosed)
    }

    /// Send `GO_AWAY` and mark this session closed for new streams.
    pub async fn go_away(&self) -> Result<(), MuxError> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner
            .write_tx
            .send(WriteCmd::Frame(
                FrameHeader {
                    frame_type: FrameType::GoAway,
                    flags: 0,
                    stream_id: 0,
                    length: 0,
                },
                Vec::new(),
            ))
            .map_err(|_| MuxError::SessionClosed)
    }

    /// Tear down the session: reset every stream and stop the reader/writer tasks.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        terminate_all_streams(&self.inner.streams);
        if let Some(handle) = self.writer_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
    }
}

async fn run_writer<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<WriteCmd>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(WriteCmd::Frame(header, body)) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &header, &body).await {
            warn!(error = %e, "mux frame write failed, closing writer");
            return;
        }
    }
}

fn send_rst(inner: &Arc<SessionInner>, stream_id: u32) {
    let _ = inner.write_tx.send(WriteCmd::Frame(
        FrameHeader {
            frame_type: FrameType::WindowUpdate,
            flags: flags::RST,
            stream_id,
            length: 0,
        },
        Vec::new(),
    ));
}

/// Accept a peer-opened stream seen via `SYN`: create its state, reply
/// `ACK`, and hand it to the caller's `accept_stream` queue.
async fn accept_new_stream(inner: &Arc<SessionInner>, stream_id: u32) -> Option<Arc<StreamShared>> {
    let shared = StreamShared::new(stream_id, inner.config.initial_window, Arc::downgrade(inner));
    shared.state.lock().established = true;
    inner.streams.lock().insert(stream_id, shared.clone());

    let _ = inner.write_tx.send(WriteCmd::Frame(
        FrameHeader {
            frame_type: FrameType::WindowUpdate,
            flags: flags::ACK,
            stream_id,
            length: 0,
        },
        Vec::new(),
    ));

    if inner.accept_tx.send(Stream { shared: shared.clone() }).await.is_err() {
        inner.streams.lock().remove(&stream_id);
        return None;
    }
    Some(shared)
}

async fn handle_data(inner: &Arc<SessionInner>, header: &FrameHeader, body: Vec<u8>) {
    let existing = inner.streams.lock().get(&header.stream_id).cloned();
    let shared = match existing {
        Some(s) => s,
        None => {
            if header.has_flag(flags::SYN) {
                match accept_new_stream(inner, header.stream_id).await {
                    Some(s) => s,
                    None => return,
                }
            } else {
                send_rst(inner, header.stream_id);
                return;
            }
        }
    };

    if shared.on_data(body).is_err() {
        warn!(stream_id = header.stream_id, "recv window exceeded, resetting stream");
        shared.on_reset();
        send_rst(inner, header.stream_id);
        return;
    }

    if header.has_flag(flags::FIN) {
        shared.on_fin();
    }
}

async fn handle_window_update(inner: &Arc<SessionInner>, header: &FrameHeader) {
    if header.has_flag(flags::RST) {
        if let Some(shared) = inner.streams.lock().get(&header.stream_id).cloned() {
            shared.on_reset();
        }
        return;
    }

    let existing = inner.streams.lock().get(&header.stream_id).cloned();
    let shared = match existing {
        Some(s) => s,
        None => {
            if header.has_flag(flags::SYN) {
                match accept_new_stream(inner, header.stream_id).await {
                    Some(s) => s,
                    None => return,
                }
            } else {
                send_rst(inner, header.stream_id);
                return;
            }
        }
    };

    shared.on_window_update(header.length, header.has_flag(flags::ACK));

    if header.has_flag(flags::FIN) {
        shared.on_fin();
    }
}

fn handle_ping(inner: &Arc<SessionInner>, header: &FrameHeader) {
    if header.has_flag(flags::SYN) {
        let _ = inner.write_tx.send(WriteCmd::Frame(
            FrameHeader {
                frame_type: FrameType::Ping,
                flags: flags::ACK,
                stream_id: 0,
                length: header.length,
            },
            Vec::new(),
        ));
    }
}

async fn run_reader<R>(mut reader: R, inner: Arc<SessionInner>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let header = match read_header(&mut reader).await {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "mux reader ended");
                break;
            }
        };

        match header.frame_type {
            FrameType::Data => {
                let body = match read_body(&mut reader, header.length).await {
                    Ok(b) => b,
                    Err(e) => {
                        debug!(error = %e, "mux reader ended while reading DATA body");
                        break;
                    }
                };
                handle_data(&inner, &header, body).await;
            }
            FrameType::WindowUpdate => handle_window_update(&inner, &header).await,
            FrameType::Ping => handle_ping(&inner, &header),
            FrameType::GoAway => {
                debug!(code = header.length, "received GO_AWAY, closing mux session");
                break;
            }
        }
    }

    inner.closed.store(true, Ordering::Release);
    terminate_all_streams(&inner.streams);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuxConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn open_accept_and_exchange_bytes() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = MuxSession::new_client(client_io, MuxConfig::default());
        let server = MuxSession::new_server(server_io, MuxConfig::default());

        let open = tokio::spawn(async move { client.open_stream().await });
        let mut server_stream = timeout(Duration::from_secs(1), server.accept_stream())
            .await
            .unwrap()
            .unwrap();
        let mut client_stream = timeout(Duration::from_secs(1), open).await.unwrap().unwrap().unwrap();

        assert_eq!(client_stream.id() % 2, 1);
        assert_eq!(server_stream.id(), client_stream.id());

        client_stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server_stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn fin_produces_eof_after_bytes_read() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = MuxSession::new_client(client_io, MuxConfig::default());
        let server = MuxSession::new_server(server_io, MuxConfig::default());

        let open = tokio::spawn(async move { client.open_stream().await });
        let mut server_stream = server.accept_stream().await.unwrap();
        let mut client_stream = open.await.unwrap().unwrap();

        client_stream.write_all(b"bye").await.unwrap();
        client_stream.shutdown().await.unwrap();

        let mut buf = Vec::new();
        server_stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"bye");
    }

    #[tokio::test]
    async fn reset_stream_surfaces_error_to_peer() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = MuxSession::new_client(client_io, MuxConfig::default());
        let server = MuxSession::new_server(server_io, MuxConfig::default());

        let open = tokio::spawn(async move { client.open_stream().await });
        let mut server_stream = server.accept_stream().await.unwrap();
        let client_stream = open.await.unwrap().unwrap();

        client_stream.reset().await;

        let mut buf = [0u8; 1];
        let result = timeout(Duration::from_secs(1), server_stream.read(&mut buf)).await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stream_ids_have_role_parity() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let client = MuxSession::new_client(client_io, MuxConfig::default());
        let _server = MuxSession::new_server(server_io, MuxConfig::default());

        let a = client.open_stream().await.unwrap();
        let b = client.open_stream().await.unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 3);
    }
}
