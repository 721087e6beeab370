//! The post-handshake byte pipe: `write`/`read`/`sendPing`/`rekeyNow`/`close`.
//!
//! Record emission is serialized by a single writer task draining a
//! bounded mpsc queue, so sequence numbers are assigned in send order
//! regardless of how many callers are enqueuing concurrently.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use flowersec_crypto::{derive_rekey_key, Direction};

use crate::config::RecordConfig;
use crate::error::E2eeError;
use crate::frame::{read_record_frame, write_record_frame, RecordFlag};
use crate::outcome::HandshakeOutcome;
use crate::record_cipher::{open_record, seal_record_framed};

enum SendCommand {
    App(Vec<u8>),
    Ping,
    Rekey,
}

/// The post-handshake E2EE byte pipe.
#[derive(Clone)]
pub struct SecureChannel {
    inner: Arc<Inner>,
}

struct Inner {
    write_tx: mpsc::Sender<SendCommand>,
    read_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    /// Plaintext bytes sitting in `read_rx` that `read()` hasn't drained yet.
    /// The reader task checks this against `recv_buffer_bytes` before
    /// admitting another app record; `read()` decrements it as it drains.
    queued_bytes: Arc<AtomicUsize>,
}

impl SecureChannel {
    /// Split `transport` and spawn the writer/reader tasks that implement
    /// the record layer, using the key material from a completed handshake.
    pub fn new<T>(transport: T, outcome: HandshakeOutcome, config: RecordConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);

        let (send_key, send_nonce_prefix, send_dir) = if outcome.is_client {
            (outcome.session_keys.c2s_key, outcome.session_keys.c2s_nonce_prefix, Direction::ClientToServer)
        } else {
            (outcome.session_keys.s2c_key, outcome.session_keys.s2c_nonce_prefix, Direction::ServerToClient)
        };
        let (recv_key, recv_nonce_prefix, recv_dir) = if outcome.is_client {
            (outcome.session_keys.s2c_key, outcome.session_keys.s2c_nonce_prefix, Direction::ServerToClient)
        } else {
            (outcome.session_keys.c2s_key, outcome.session_keys.c2s_nonce_prefix, Direction::ClientToServer)
        };

        let closed = Arc::new(AtomicBool::new(false));
        let queued_bytes = Arc::new(AtomicUsize::new(0));
        let (write_tx, write_rx) = mpsc::channel::<SendCommand>(64);
        let (read_tx, read_rx) = mpsc::channel::<Vec<u8>>(64);

        let writer_handle = tokio::spawn(run_writer(
            write_half,
            write_rx,
            send_key,
            send_nonce_prefix,
            outcome.next_send_seq,
            outcome.session_keys.rekey_base,
            outcome.transcript_hash,
            send_dir,
            config.max_plaintext_len(),
            closed.clone(),
        ));

        let reader_handle = tokio::spawn(run_reader(
            read_half,
            read_tx,
            recv_key,
            recv_nonce_prefix,
            outcome.next_recv_seq,
            outcome.session_keys.rekey_base,
            outcome.transcript_hash,
            recv_dir,
            config,
            closed.clone(),
            queued_bytes.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                write_tx,
                read_rx: Mutex::new(read_rx),
                closed,
                writer_handle: Mutex::new(Some(writer_handle)),
                reader_handle: Mutex::new(Some(reader_handle)),
                queued_bytes,
            }),
        }
    }

    /// Split `bytes` into record-sized chunks and enqueue them for the send loop.
    pub async fn write(&self, bytes: &[u8], max_plaintext_len: usize) -> Result<(), E2eeError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(E2eeError::Closed);
        }
        if bytes.is_empty() {
            return self.enqueue(SendCommand::App(Vec::new())).await;
        }
        for chunk in bytes.chunks(max_plaintext_len.max(1)) {
            self.enqueue(SendCommand::App(chunk.to_vec())).await?;
        }
        Ok(())
    }

    /// Return the next decrypted `app` frame; `ping`/`rekey` records are
    /// handled transparently by the reader task and never surfaced here.
    pub async fn read(&self) -> Result<Vec<u8>, E2eeError> {
        let mut rx = self.inner.read_rx.lock().await;
        let bytes = rx.recv().await.ok_or(E2eeError::Closed)?;
        self.inner.queued_bytes.fetch_sub(bytes.len(), Ordering::AcqRel);
        Ok(bytes)
    }

    pub async fn send_ping(&self) -> Result<(), E2eeError> {
        self.enqueue(SendCommand::Ping).await
    }

    pub async fn rekey_now(&self) -> Result<(), E2eeError> {
        self.enqueue(SendCommand::Rekey).await
    }

    async fn enqueue(&self, cmd: SendCommand) -> Result<(), E2eeError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(E2eeError::Closed);
        }
        self.inner.write_tx.send(cmd).await.map_err(|_| E2eeError::Closed)
    }

    /// Fail pending senders, reject future ops, and close the transport.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Some(handle) = self.inner.writer_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.reader_handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<SendCommand>,
    mut send_key: [u8; 32],
    send_nonce_prefix: [u8; 4],
    mut send_seq: u64,
    rekey_base: [u8; 32],
    transcript_hash: [u8; 32],
    send_dir: Direction,
    _max_plaintext_len: usize,
    closed: Arc<AtomicBool>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = rx.recv().await {
        if closed.load(Ordering::Acquire) {
            break;
        }
        let (flag, plaintext) = match cmd {
            SendCommand::App(bytes) => (RecordFlag::App, bytes),
            SendCommand::Ping => (RecordFlag::Ping, Vec::new()),
            SendCommand::Rekey => (RecordFlag::Rekey, Vec::new()),
        };
        let seq = send_seq;

        let (header, ciphertext) = match seal_record_framed(&send_key, &send_nonce_prefix, flag, seq, &plaintext) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "record seal failed, closing secure channel");
                closed.store(true, Ordering::Release);
                return;
            }
        };

        if let Err(e) = write_record_frame(&mut writer, &header, &ciphertext).await {
            warn!(error = %e, "record write failed, closing secure channel");
            closed.store(true, Ordering::Release);
            return;
        }

        send_seq += 1;

        if flag == RecordFlag::Rekey {
            match derive_rekey_key(&rekey_base, &transcript_hash, seq, send_dir) {
                Ok(new_key) => {
                    debug!(seq, "advanced send key after rekey");
                    send_key = new_key;
                }
                Err(e) => {
                    warn!(error = %e, "rekey derivation failed, closing secure channel");
                    closed.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reader<R>(
    mut reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    mut recv_key: [u8; 32],
    recv_nonce_prefix: [u8; 4],
    mut recv_seq: u64,
    rekey_base: [u8; 32],
    transcript_hash: [u8; 32],
    recv_dir: Direction,
    config: RecordConfig,
    closed: Arc<AtomicBool>,
    queued_bytes: Arc<AtomicUsize>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        if closed.load(Ordering::Acquire) {
            return;
        }

        let (header, ciphertext) = match read_record_frame(&mut reader, config.max_record_bytes).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "record read ended, closing secure channel");
                closed.store(true, Ordering::Release);
                return;
            }
        };

        if header.seq != recv_seq {
            warn!(expected = recv_seq, actual = header.seq, "record_bad_seq, closing secure channel");
            closed.store(true, Ordering::Release);
            return;
        }

        let flag = match RecordFlag::from_byte(header.flags) {
            Ok(f) => f,
            Err(_) => {
                warn!(flag = header.flags, "record_bad_flag, closing secure channel");
                closed.store(true, Ordering::Release);
                return;
            }
        };

        let plaintext = match open_record(&recv_key, &recv_nonce_prefix, &header, &ciphertext) {
            Ok(p) => p,
            Err(_) => {
                warn!("record_decrypt_failed, closing secure channel");
                closed.store(true, Ordering::Release);
                return;
            }
        };

        recv_seq += 1;

        match flag {
            RecordFlag::App => {
                let pending = queued_bytes.fetch_add(plaintext.len(), Ordering::AcqRel) + plaintext.len();
                if pending > config.recv_buffer_bytes {
                    warn!("recv_buffer_exceeded, closing secure channel");
                    closed.store(true, Ordering::Release);
                    return;
                }
                if tx.send(plaintext).await.is_err() {
                    return;
                }
            }
            RecordFlag::Ping => {
                // no-op keepalive acknowledgement
            }
            RecordFlag::Rekey => match derive_rekey_key(&rekey_base, &transcript_hash, header.seq, recv_dir) {
                Ok(new_key) => {
                    debug!(seq = header.seq, "advanced recv key after rekey");
                    recv_key = new_key;
                }
                Err(e) => {
                    warn!(error = %e, "rekey derivation failed, closing secure channel");
                    closed.store(true, Ordering::Release);
                    return;
                }
            },
        }
    }
}
