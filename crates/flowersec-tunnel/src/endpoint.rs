//! One side of a paired channel: a single actor task owns the transport
//! exclusively and both reads incoming frames (forwarding binary payloads
//! to whatever peer is currently set) and drains an outbound command
//! queue — writes bounded in bytes, locally and against a session-wide
//! total, with a per-frame write timeout, plus an explicit close command
//! for rejected attaches. Folding read and write into one task keeps the
//! "only one place ever touches the transport" discipline used by
//! `SecureChannel` and the mux session, without needing the transport to
//! split into independent read/write halves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::CloseReason;
use crate::message::{TunnelMessage, WsTransport};

struct QueuedMessage {
    message: TunnelMessage,
    _local_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

enum Command {
    Send(QueuedMessage),
    Close(u16, String),
}

/// One connection's forwarding/write state. Always held behind an `Arc`;
/// [`Endpoint::spawn`] returns the shared handle directly.
pub struct Endpoint {
    tx: mpsc::UnboundedSender<Command>,
    local_budget: Arc<Semaphore>,
    global_budget: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    closed_notify: Notify,
    peer: Mutex<Option<Weak<Endpoint>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    pub fn spawn(
        transport: Box<dyn WsTransport>,
        local_queue_bytes: usize,
        global_budget: Arc<Semaphore>,
        write_timeout: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Self {
            tx,
            local_budget: Arc::new(Semaphore::new(local_queue_bytes)),
            global_budget,
            closed: Arc::new(AtomicBool::new(false)),
            closed_notify: Notify::new(),
            peer: Mutex::new(None),
            task: Mutex::new(None),
        });

        let actor_handle = endpoint.clone();
        let handle = tokio::spawn(run_actor(transport, rx, actor_handle, write_timeout));
        *endpoint.task.lock() = Some(handle);
        endpoint
    }

    /// Point this endpoint's forwarder at `peer`. Held as a `Weak` so two
    /// paired endpoints never keep each other alive through a reference
    /// cycle — dropping one side lets it (and its task) tear down even
    /// while the other still exists.
    pub fn set_peer(&self, peer: Weak<Endpoint>) {
        *self.peer.lock() = Some(peer);
    }

    /// Enqueue `message` for write. Returns `false` without enqueuing if
    /// either byte budget is exhausted or the connection is already
    /// closed.
    pub fn try_enqueue(&self, message: TunnelMessage) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let len = message_len(&message);
        let Ok(local_permit) = Arc::clone(&self.local_budget).try_acquire_many_owned(len) else {
            return false;
        };
        let Ok(global_permit) = Arc::clone(&self.global_budget).try_acquire_many_owned(len) else {
            return false;
        };
        self.tx
            .send(Command::Send(QueuedMessage { message, _local_permit: local_permit, _global_permit: global_permit }))
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until this endpoint has closed, however that happened.
    pub async fn closed(&self) {
        loop {
            if self.is_closed() {
                return;
            }
            let notified = self.closed_notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Ask the actor to send a WebSocket close frame with `code`/`reason`
    /// and stop. Marks the endpoint closed immediately so no further
    /// writes are accepted, even before the actor processes the command.
    pub fn request_close(&self, code: u16, reason: String) {
        self.mark_closed();
        let _ = self.tx.send(Command::Close(code, reason));
    }

    /// Mark closed and abort the actor task without a graceful close
    /// frame. Idempotent.
    pub fn shut_down(&self) {
        self.mark_closed();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        self.closed_notify.notify_waiters();
    }

    fn peer_handle(&self) -> Option<Arc<Endpoint>> {
        self.peer.lock().clone().and_then(|weak| weak.upgrade())
    }
}

async fn run_actor(
    mut transport: Box<dyn WsTransport>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    this: Arc<Endpoint>,
    write_timeout: Duration,
) {
    loop {
        tokio::select! {
            incoming = transport.recv() => {
                match incoming {
                    Some(TunnelMessage::Binary(bytes)) => {
                        if let Some(peer) = this.peer_handle() {
                            peer.try_enqueue(TunnelMessage::Binary(bytes));
                        }
                    }
                    Some(TunnelMessage::Text(_)) => {
                        warn!("binary-only connection received a text frame, closing");
                        if let Some(peer) = this.peer_handle() {
                            peer.shut_down();
                        }
                        transport.close(CloseReason::POLICY_VIOLATION, "protocol_violation".to_string()).await;
                        this.mark_closed();
                        return;
                    }
                    None => {
                        this.mark_closed();
                        return;
                    }
                }
            }
            command = rx.recv() => {
                match command {
                    Some(Command::Send(queued)) => {
                        match tokio::time::timeout(write_timeout, transport.send(queued.message)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                warn!(error = %e, "tunnel connection write failed, closing");
                                this.mark_closed();
                                return;
                            }
                            Err(_) => {
                                warn!("tunnel connection write timed out, closing");
                                this.mark_closed();
                                return;
                            }
                        }
                    }
                    Some(Command::Close(code, reason)) => {
                        transport.close(code, reason).await;
                        this.mark_closed();
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}

fn message_len(message: &TunnelMessage) -> u32 {
    let len = match message {
        TunnelMessage::Text(s) => s.len(),
        TunnelMessage::Binary(b) => b.len(),
    };
    len.min(u32::MAX as usize) as u32
}
